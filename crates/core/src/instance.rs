//! Instance identifier and lifecycle state machine.
//!
//! See the state/transition table this mirrors: `NOT_RUNNING -> STARTING ->
//! WORKING -> FINISHED -> NOT_RUNNING`, with `TERMINATING -> TERMINATED ->
//! NOT_RUNNING` as the deadline/cancellation path.

use crate::id::{InstanceId, Token, WorkerName};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    NotRunning,
    /// Reserved for future admission control; the core never enters this
    /// state today (see Open Questions).
    Queued,
    Starting,
    Working,
    Finished,
    Terminating,
    Terminated,
    Zombie,
}

crate::simple_display! {
    InstanceState {
        NotRunning => "not_running",
        Queued => "queued",
        Starting => "starting",
        Working => "working",
        Finished => "finished",
        Terminating => "terminating",
        Terminated => "terminated",
        Zombie => "zombie",
    }
}

impl InstanceState {
    /// States in which an instance counts toward the "one running instance
    /// per worker name" invariant.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            InstanceState::Starting
                | InstanceState::Working
                | InstanceState::Finished
                | InstanceState::Terminating
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::NotRunning)
    }
}

/// A rejected state transition: `from` does not have an edge for `event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition: {from} does not accept {event}")]
pub struct InvalidTransition {
    pub from: InstanceState,
    pub event: TransitionEvent,
}

/// Events that drive state transitions (§4.2 of the transition table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    RunAccepted,
    Registered,
    StartDeadlineElapsed,
    Terminate,
    Updated,
    WorkDeadlineElapsed,
    Finished,
    PidGone,
    FinishKillDeadlineElapsed,
    TermKillDeadlineElapsed,
}

crate::simple_display! {
    TransitionEvent {
        RunAccepted => "run_accepted",
        Registered => "registered",
        StartDeadlineElapsed => "start_deadline_elapsed",
        Terminate => "terminate",
        Updated => "updated",
        WorkDeadlineElapsed => "work_deadline_elapsed",
        Finished => "finished",
        PidGone => "pid_gone",
        FinishKillDeadlineElapsed => "finish_kill_deadline_elapsed",
        TermKillDeadlineElapsed => "term_kill_deadline_elapsed",
    }
}

/// Apply `event` to `from`, returning the resulting state or rejecting the
/// transition if no edge exists. Pure function: the caller (the Instance
/// Table) is responsible for side effects (event sink rows, monitor fan-out,
/// scratch directory cleanup).
pub fn transition(
    from: InstanceState,
    event: TransitionEvent,
) -> Result<InstanceState, InvalidTransition> {
    use InstanceState::*;
    use TransitionEvent::*;
    let to = match (from, event) {
        (NotRunning, RunAccepted) => Starting,
        (Starting, Registered) => Working,
        (Starting, StartDeadlineElapsed) => Terminating,
        (Starting, Terminate) => Terminating,
        (Working, Updated) => Working,
        (Working, WorkDeadlineElapsed) => Terminating,
        (Working, TransitionEvent::Finished) => InstanceState::Finished,
        (Working, Terminate) => Terminating,
        (InstanceState::Finished, PidGone) => NotRunning,
        (InstanceState::Finished, FinishKillDeadlineElapsed) => InstanceState::Finished,
        (Terminating, PidGone) => Terminated,
        (Terminating, TermKillDeadlineElapsed) => Terminating,
        (Terminated, PidGone) => NotRunning,
        _ => return Err(InvalidTransition { from, event }),
    };
    Ok(to)
}

/// Opaque handle used to call back into a Worker Runtime. Cleared on any
/// observed peer death; the concrete wiring (a channel, a socket) lives in
/// the daemon crate, which is the only place that needs to invoke it.
pub trait RemoteHandle: Send + Sync {
    /// Returns false once the peer is known to be dead (closed channel,
    /// broken socket). A dead handle is never retried.
    fn is_alive(&self) -> bool;
}

/// One live (or just-finished) execution of a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: WorkerName,
    pub state: InstanceState,
    pub started: u64,
    pub registered: Option<u64>,
    pub updated: Option<u64>,
    pub finished: Option<u64>,
    pub terminated: Option<u64>,
    pub pid: Option<u32>,
    #[serde(skip)]
    pub token: Option<Token>,
    pub progress: f64,
    pub exit_code: Option<i32>,
}

impl Instance {
    pub fn new(id: InstanceId, name: WorkerName, started_ms: u64, token: Token) -> Self {
        Self {
            id,
            name,
            state: InstanceState::Starting,
            started: started_ms,
            registered: None,
            updated: None,
            finished: None,
            terminated: None,
            pid: None,
            token: Some(token),
            progress: 0.0,
            exit_code: None,
        }
    }

    /// Apply a progress report. Reports from the Worker Runtime may
    /// explicitly retrogress (e.g. retries); the monotonic-non-decreasing
    /// invariant only binds the supervisor's own derivations, never the
    /// worker's self-reported value.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = progress.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_sequence() {
        use InstanceState::*;
        use TransitionEvent::*;
        let s = transition(NotRunning, RunAccepted).unwrap();
        assert_eq!(s, Starting);
        let s = transition(s, Registered).unwrap();
        assert_eq!(s, Working);
        let s = transition(s, TransitionEvent::Finished).unwrap();
        assert_eq!(s, InstanceState::Finished);
        let s = transition(s, PidGone).unwrap();
        assert_eq!(s, NotRunning);
    }

    #[test]
    fn starting_deadline_routes_through_terminating_to_terminated() {
        use InstanceState::*;
        use TransitionEvent::*;
        let s = transition(Starting, StartDeadlineElapsed).unwrap();
        assert_eq!(s, Terminating);
        let s = transition(s, PidGone).unwrap();
        assert_eq!(s, Terminated);
        let s = transition(s, PidGone).unwrap();
        assert_eq!(s, NotRunning);
    }

    #[test]
    fn rejects_transitions_with_no_edge() {
        use InstanceState::*;
        use TransitionEvent::*;
        assert!(transition(NotRunning, Registered).is_err());
        assert!(transition(InstanceState::Finished, Updated).is_err());
        assert!(transition(Terminated, TransitionEvent::Finished).is_err());
    }

    #[test]
    fn work_deadline_and_terminate_both_lead_to_terminating() {
        use InstanceState::*;
        use TransitionEvent::*;
        assert_eq!(transition(Working, WorkDeadlineElapsed).unwrap(), Terminating);
        assert_eq!(transition(Working, Terminate).unwrap(), Terminating);
    }

    #[test]
    fn finish_kill_deadline_is_idempotent_until_pid_gone() {
        use InstanceState::*;
        use TransitionEvent::*;
        assert_eq!(
            transition(InstanceState::Finished, FinishKillDeadlineElapsed).unwrap(),
            InstanceState::Finished
        );
        assert_eq!(transition(InstanceState::Finished, PidGone).unwrap(), NotRunning);
    }

    #[test]
    fn progress_is_clamped_into_unit_interval() {
        let mut inst =
            Instance::new(InstanceId::new(1), WorkerName::parse("a").unwrap(), 0, Token::generate());
        inst.set_progress(1.5);
        assert_eq!(inst.progress, 1.0);
        inst.set_progress(-0.5);
        assert_eq!(inst.progress, 0.0);
    }

    #[test]
    fn running_states_match_spec_running_set() {
        assert!(InstanceState::Starting.is_running());
        assert!(InstanceState::Working.is_running());
        assert!(InstanceState::Finished.is_running());
        assert!(InstanceState::Terminating.is_running());
        assert!(!InstanceState::NotRunning.is_running());
        assert!(!InstanceState::Queued.is_running());
        assert!(!InstanceState::Terminated.is_running());
    }
}
