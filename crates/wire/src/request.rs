//! Requests sent to the Supervisor Core: client RPCs plus the worker-facing
//! register/update/finish verbs exchanged on the local endpoint.

use procd_core::{InstanceId, MonitorType, SubscriptionTarget, WorkerName};
use serde::{Deserialize, Serialize};

/// A client's or worker's RPC call to the Supervisor Core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    Hello { version: String },
    Ping,

    ListWorkers,
    QueryWorker { name: WorkerName, keys: Vec<String> },
    QueryWorkers { names: Vec<WorkerName>, keys: Vec<String> },

    Run {
        name: WorkerName,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        monitor: Option<MonitorType>,
        #[serde(default)]
        debug: bool,
    },
    Terminate { id: InstanceId },

    SubscribeWorker { name: WorkerName, monitor_type: MonitorType },
    SubscribeWorkers { monitor_type: MonitorType },
    SubscribeInstance { id: InstanceId, monitor_type: MonitorType },
    UnsubscribeWorker { name: WorkerName },
    UnsubscribeWorkers,
    UnsubscribeInstance { id: InstanceId },

    /// Worker-facing: register a freshly spawned child.
    Register {
        name: WorkerName,
        pid: u32,
        token: Option<String>,
    },
    /// Worker-facing: forward buffered output. Channel `1` is stdout, `2`
    /// stderr, `3` the structured stdlog stream.
    Update {
        id: InstanceId,
        buffers: Vec<(u8, Vec<u8>)>,
    },
    Finish {
        id: InstanceId,
        exit_code: Option<i32>,
    },
    SetUpdateIntervalAck {
        id: InstanceId,
    },
}

/// Translate a subscription call's target/type pair into the corresponding
/// [`Request`] variant.
pub fn subscribe_request(target: SubscriptionTarget, monitor_type: MonitorType) -> Request {
    match target {
        SubscriptionTarget::Instance(id) => Request::SubscribeInstance { id, monitor_type },
        SubscriptionTarget::Worker(name) => Request::SubscribeWorker { name, monitor_type },
        SubscriptionTarget::All => Request::SubscribeWorkers { monitor_type },
    }
}
