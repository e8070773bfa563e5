//! Deadline configuration driving the Instance Table's timers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-process deadlines for the lifecycle state machine (§4.2 defaults).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub start_deadline: Duration,
    pub work_deadline: Duration,
    pub finish_kill_deadline: Duration,
    pub term_kill_deadline: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            start_deadline: Duration::from_secs(5),
            work_deadline: Duration::from_secs(30),
            finish_kill_deadline: Duration::from_secs(2),
            term_kill_deadline: Duration::from_secs(5),
        }
    }
}

impl Deadlines {
    crate::setters! {
        set {
            start_deadline: Duration,
            work_deadline: Duration,
            finish_kill_deadline: Duration,
            term_kill_deadline: Duration,
        }
    }
}
