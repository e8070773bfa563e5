//! Commands the Supervisor Core pushes down to a connected Worker Runtime,
//! unsolicited, on the same framed connection the runtime used to `register`.

use serde::{Deserialize, Serialize};

/// A directive the supervisor sends to a worker it has already registered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    /// Send `SIGTERM` to the child and exit once it does.
    Terminate,
    /// Switch the heartbeat cadence (ms between `update` calls). Sent once
    /// when the first/last REALTIME subscription against this instance
    /// appears/disappears.
    SetUpdateInterval { interval_ms: u64 },
}
