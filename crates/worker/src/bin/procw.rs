use clap::Parser;
use procd_worker::WorkerArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Worker Runtime: wraps a single spawned program, captures its output, and
/// reports its lifecycle back to the Supervisor Core it was launched by.
#[derive(Parser, Debug)]
#[command(name = "procw", version)]
struct Args {
    /// The dot-grammar worker name this instance was run as.
    name: String,
    #[arg(long)]
    server_socket: Option<PathBuf>,
    #[arg(long)]
    server_token: Option<String>,
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

    let exit = procd_worker::run(WorkerArgs {
        name: args.name,
        server_socket: args.server_socket,
        server_token: args.server_token,
        debug: args.debug,
    })
    .await;

    if exit == 0 {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::FAILURE
    }
}
