use clap::Parser;
use procd_daemon::config::{CliOverrides, Config};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Supervisor Core: owns the Instance Table, Monitor Registry, and
/// Catalogue, and serves both the worker-facing Unix socket and the
/// optional TCP client endpoint.
#[derive(Parser, Debug)]
#[command(name = "procd", version)]
struct Args {
    /// Namespaces the run/tmp/var prefixes and the worker socket path.
    #[arg(long)]
    name: Option<String>,
    /// TCP port for the network client endpoint; omit to serve the worker
    /// socket only.
    #[arg(long)]
    client_port: Option<u16>,
    #[arg(long)]
    run_prefix: Option<PathBuf>,
    #[arg(long)]
    tmp_prefix: Option<PathBuf>,
    #[arg(long)]
    var_prefix: Option<PathBuf>,
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::resolve(CliOverrides {
        name: args.name,
        client_port: args.client_port,
        run_prefix: args.run_prefix,
        tmp_prefix: args.tmp_prefix,
        var_prefix: args.var_prefix,
        debug: args.debug,
    });

    let shutdown = CancellationToken::new();
    let shutdown_signals = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_signals.cancel();
    });

    match procd_daemon::run(config, shutdown).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "supervisor core failed to start");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());
    let (mut sigterm, mut sigint) = match (sigterm, sigint) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            // Signal handlers failed to install; fall back to Ctrl+C only.
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
