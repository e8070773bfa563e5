//! `procctl` subcommand definitions and handlers.

use anyhow::{bail, Result};
use clap::{Args, Subcommand, ValueEnum};
use procd_core::{InstanceId, MonitorType, SubscriptionTarget, WorkerName};

use crate::client::DaemonClient;
use crate::output::{handle_list, parse_instance_id, print_monitor_event, print_values, OutputFormat};

/// `clap`-friendly mirror of [`MonitorType`]; `procd-core` doesn't depend on
/// `clap`, so the CLI surface keeps its own value enum and maps across.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MonitorKind {
    Progress,
    Realtime,
}

impl From<MonitorKind> for MonitorType {
    fn from(kind: MonitorKind) -> Self {
        match kind {
            MonitorKind::Progress => MonitorType::Progress,
            MonitorKind::Realtime => MonitorType::Realtime,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Exchange protocol versions with the Supervisor Core.
    Hello,
    /// Round-trip liveness check.
    Ping,
    /// List every worker in the Catalogue.
    ListWorkers,
    /// Query one worker's descriptor fields (title, desc, mtime).
    Query {
        name: String,
        #[arg(long, value_delimiter = ',', default_value = "title,desc,mtime")]
        keys: Vec<String>,
    },
    /// Run a worker, printing the instance id the Supervisor Core assigns it.
    Run {
        name: String,
        /// Arguments forwarded to the worker's resolved command line.
        args: Vec<String>,
        #[arg(long, value_enum)]
        monitor: Option<MonitorKind>,
        /// Ask the worker runtime to log at debug level.
        #[arg(long)]
        debug: bool,
    },
    /// Terminate a running instance.
    Terminate {
        #[arg(value_parser = parse_instance_id)]
        id: InstanceId,
    },
    /// Subscribe to monitor events and print them until interrupted.
    Subscribe(SubscribeArgs),
}

#[derive(Args)]
pub struct SubscribeArgs {
    /// Worker name to watch; omit with `--all` to watch every worker.
    name: Option<String>,
    #[arg(long, conflicts_with = "name")]
    all: bool,
    #[arg(long)]
    instance: Option<u64>,
    #[arg(long, value_enum, default_value = "progress")]
    monitor: MonitorKind,
}

fn parse_target(name: Option<String>, all: bool, instance: Option<u64>) -> Result<SubscriptionTarget> {
    match (name, all, instance) {
        (_, _, Some(id)) => Ok(SubscriptionTarget::Instance(InstanceId::new(id))),
        (Some(name), false, None) => Ok(SubscriptionTarget::Worker(WorkerName::parse(name)?)),
        (None, true, None) => Ok(SubscriptionTarget::All),
        _ => bail!("specify a worker name, --instance <id>, or --all"),
    }
}

pub async fn handle(command: Command, client: &mut DaemonClient, format: OutputFormat) -> Result<()> {
    match command {
        Command::Hello => {
            let version = client.hello().await?;
            println!("supervisor core speaks protocol {version}");
        }
        Command::Ping => {
            client.ping().await?;
            println!("pong");
        }
        Command::ListWorkers => {
            let mut names = client.list_workers().await?;
            names.sort();
            handle_list(format, &names, "No workers registered", |items| {
                for name in items {
                    println!("{name}");
                }
            })?;
        }
        Command::Query { name, keys } => {
            let values = client.query_worker(WorkerName::parse(name)?, keys).await?;
            print_values(format, &values)?;
        }
        Command::Run { name, args, monitor, debug } => {
            let id = client.run(WorkerName::parse(name)?, args, monitor.map(Into::into), debug).await?;
            println!("{id}");
        }
        Command::Terminate { id } => {
            client.terminate(id).await?;
            println!("terminate requested for {id}");
        }
        Command::Subscribe(args) => {
            let monitor_type = args.monitor.into();
            let target = parse_target(args.name, args.all, args.instance)?;
            client.subscribe(target, monitor_type).await?;
            client.read_events(|event| print_monitor_event(format, &event)).await?;
        }
    }
    Ok(())
}
