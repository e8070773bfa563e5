// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The Event Sink: an append-only record of instance lifecycle events.
//!
//! [`EventSink`] is a trait because the persistent recorder is treated as an
//! opaque collaborator; [`FileEventSink`] is the default append-only
//! JSON-lines implementation used when no other sink is configured.

mod file_sink;

pub use file_sink::FileEventSink;

use procd_core::{InstanceId, WorkerName};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One durable fact about an instance's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventRecord {
    Started { id: InstanceId, name: WorkerName, started: u64 },
    Finished { id: InstanceId, finished: u64, exit_code: Option<i32> },
}

impl EventRecord {
    pub fn instance_id(&self) -> InstanceId {
        match self {
            EventRecord::Started { id, .. } => *id,
            EventRecord::Finished { id, .. } => *id,
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("opening event sink at {path}: {source}")]
    Open { path: std::path::PathBuf, source: std::io::Error },
    #[error("appending to event sink: {source}")]
    Append { source: std::io::Error },
    #[error("flushing event sink: {source}")]
    Flush { source: std::io::Error },
    #[error("replaying event sink: malformed record at line {line}: {source}")]
    Malformed { line: usize, source: serde_json::Error },
}

/// Durable record of instance lifecycle events, and the source of truth for
/// instance id assignment (ids are monotonically increasing and never
/// reused, even across restarts).
pub trait EventSink: Send {
    /// Assign a fresh, monotonically increasing instance id.
    fn next_instance_id(&mut self) -> InstanceId;

    fn record_started(&mut self, id: InstanceId, name: &WorkerName, started: u64) -> Result<(), SinkError>;

    fn record_finished(&mut self, id: InstanceId, finished: u64, exit_code: Option<i32>) -> Result<(), SinkError>;

    /// Replay every durable record in insertion order, used to rebuild
    /// zombie-detection state at startup.
    fn replay(&self) -> Result<Vec<EventRecord>, SinkError>;
}
