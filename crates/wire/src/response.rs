//! Responses the Supervisor Core sends back to clients and workers.

use procd_core::{InstanceId, WorkerDescriptor, WorkerName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error conditions defined in the RPC surface's error table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "error")]
pub enum RpcError {
    #[error("worker name violates grammar: {name}")]
    InvalidName { name: String },
    #[error("unknown worker: {name}")]
    UnknownWorker { name: String },
    #[error("unknown instance: {id}")]
    UnknownInstance { id: InstanceId },
    #[error("worker already running as instance {existing_id}")]
    AlreadyRunning { existing_id: InstanceId },
    #[error("instance {id} is not registered")]
    NotRegistered { id: InstanceId },
    #[error("terminate: bad token or unknown session")]
    TerminateProcess,
    #[error("malformed syslog line: {reason}")]
    ParseError { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello { version: String },
    Error(RpcError),

    Workers { names: Vec<WorkerName> },
    WorkerValues { values: BTreeMap<String, Option<String>> },
    WorkersValues { values: BTreeMap<WorkerName, Option<BTreeMap<String, Option<String>>>> },

    Ran { id: InstanceId },

    /// `register` reply: accepted with the assigned instance id, or a
    /// directive that the child must not continue.
    Registered { id: InstanceId },
    TerminateDirective,
    AlreadyRegistered { existing_id: InstanceId },

    SetUpdateIntervalAck { id: InstanceId },
}

/// A push message the Supervisor Core sends to a subscribed peer. Carries no
/// reply; the peer's transport delivers it best-effort and dead peers are
/// dropped by the Monitor Registry rather than erroring the sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MonitorEvent {
    MonitorNew { id: InstanceId, name: WorkerName },
    MonitorStarting { id: InstanceId },
    MonitorWorking { id: InstanceId },
    MonitorFinished { id: InstanceId, exit_code: Option<i32> },
    MonitorTerminating { id: InstanceId },
    MonitorTerminated { id: InstanceId },
    MonitorNotRunning { id: InstanceId },
    MonitorUpdate {
        name: WorkerName,
        id: InstanceId,
        progress: f64,
        #[serde(default)]
        buffers: Vec<(u8, Vec<u8>)>,
    },
    MonitorModified { name: WorkerName },
    MonitorDeleted { name: WorkerName },
}

impl Response {
    pub fn descriptor_values(desc: &WorkerDescriptor, keys: &[String]) -> BTreeMap<String, Option<String>> {
        keys.iter()
            .map(|key| {
                let value = match key.as_str() {
                    "title" => Some(desc.title.clone()),
                    "desc" => Some(desc.desc.clone()),
                    "mtime" => Some(desc.mtime.to_string()),
                    _ => None,
                };
                (key.clone(), value)
            })
            .collect()
    }
}
