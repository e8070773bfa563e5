use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use clap::Parser;
use procd_cli::client::DaemonClient;
use procd_cli::commands::{self, Command};
use procd_cli::output::OutputFormat;
use procd_daemon::config::{CliOverrides, Config};

/// Client for the Supervisor Core: queries the Catalogue, runs and
/// terminates workers, and streams monitor subscriptions.
#[derive(Parser)]
#[command(name = "procctl", version)]
struct Cli {
    /// Matches the `--name` the target `procd` was started with.
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    run_prefix: Option<PathBuf>,
    /// Connect over TCP to this host instead of the local worker socket.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// If set, connect over TCP to `host:client_port` instead of the Unix socket.
    #[arg(long)]
    client_port: Option<u16>,
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::resolve(CliOverrides {
        name: cli.name,
        client_port: cli.client_port,
        run_prefix: cli.run_prefix,
        tmp_prefix: None,
        var_prefix: None,
        debug: false,
    });

    let tcp_addr = match config.client_port {
        Some(port) => Some(resolve_addr(&cli.host, port)?),
        None => None,
    };

    let mut client = DaemonClient::connect(&config.socket_path(), tcp_addr).await?;
    commands::handle(cli.command, &mut client, cli.output).await
}

fn resolve_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve {host}:{port}"))
}
