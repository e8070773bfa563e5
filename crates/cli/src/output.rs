//! Text/JSON rendering shared by `procctl`'s subcommands.

use clap::ValueEnum;
use procd_core::InstanceId;
use procd_wire::MonitorEvent;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render a list as a plain column dump (text) or as a JSON array.
pub fn handle_list<T: Serialize>(
    format: OutputFormat,
    items: &[T],
    empty_msg: &str,
    render_text: impl FnOnce(&[T]),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("{empty_msg}");
            } else {
                render_text(items);
            }
        }
    }
    Ok(())
}

pub fn print_values(format: OutputFormat, values: &std::collections::BTreeMap<String, Option<String>>) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(values)?),
        OutputFormat::Text => {
            for (key, value) in values {
                match value {
                    Some(v) => println!("{key}: {v}"),
                    None => println!("{key}: -"),
                }
            }
        }
    }
    Ok(())
}

/// One line per pushed monitor event, in the style of `tail -f`. Returns
/// `false` once a terminal event for `id` (when narrowed to one instance)
/// closes out the stream — the caller stops reading after that.
pub fn print_monitor_event(format: OutputFormat, event: &MonitorEvent) -> bool {
    match format {
        OutputFormat::Json => {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
        }
        OutputFormat::Text => println!("{}", describe_event(event)),
    }
    !matches!(event, MonitorEvent::MonitorNotRunning { .. })
}

fn describe_event(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::MonitorNew { id, name } => format!("{id} [{name}] new"),
        MonitorEvent::MonitorStarting { id } => format!("{id} starting"),
        MonitorEvent::MonitorWorking { id } => format!("{id} working"),
        MonitorEvent::MonitorFinished { id, exit_code } => {
            format!("{id} finished (exit_code={})", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()))
        }
        MonitorEvent::MonitorTerminating { id } => format!("{id} terminating"),
        MonitorEvent::MonitorTerminated { id } => format!("{id} terminated"),
        MonitorEvent::MonitorNotRunning { id } => format!("{id} not_running"),
        MonitorEvent::MonitorUpdate { id, name, progress, buffers } => {
            format!("{id} [{name}] progress={progress:.1} ({} buffer(s))", buffers.len())
        }
        MonitorEvent::MonitorModified { name } => format!("[{name}] catalogue entry modified"),
        MonitorEvent::MonitorDeleted { name } => format!("[{name}] catalogue entry removed"),
    }
}

/// Parse a CLI instance-id argument (a bare integer).
pub fn parse_instance_id(s: &str) -> Result<InstanceId, std::num::ParseIntError> {
    s.parse().map(InstanceId::new)
}
