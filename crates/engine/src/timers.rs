//! Periodic deadline sweeps run by the Supervisor Core's event loop. Each
//! sweep is a pure scan over the Instance Table's indices; pid liveness is
//! injected as a closure since checking an OS pid is the daemon crate's
//! concern (it reaches for `nix::sys::signal::kill` with a `None` signal).

use crate::InstanceTable;
use procd_core::{Deadlines, InstanceId, TransitionEvent};

/// `STARTING` instances with no registration at `start_deadline` move to
/// `TERMINATING`.
pub fn sweep_start_deadline(table: &mut InstanceTable, now: u64, deadlines: &Deadlines) -> Vec<InstanceId> {
    let threshold = deadlines.start_deadline.as_millis() as u64;
    let elapsed: Vec<InstanceId> =
        table.starting().filter(|&id| table.get(id).is_some_and(|i| now.saturating_sub(i.started) >= threshold)).collect();
    for id in &elapsed {
        let _ = table.apply(*id, TransitionEvent::StartDeadlineElapsed, now);
    }
    elapsed
}

/// `WORKING` instances whose `updated` stalls at `work_deadline` move to
/// `TERMINATING`.
pub fn sweep_work_deadline(table: &mut InstanceTable, now: u64, deadlines: &Deadlines) -> Vec<InstanceId> {
    let threshold = deadlines.work_deadline.as_millis() as u64;
    let elapsed: Vec<InstanceId> = table
        .registered()
        .filter(|&id| {
            table.get(id).is_some_and(|i| {
                let last = i.updated.unwrap_or(i.registered.unwrap_or(i.started));
                now.saturating_sub(last) >= threshold
            })
        })
        .collect();
    for id in &elapsed {
        let _ = table.apply(*id, TransitionEvent::WorkDeadlineElapsed, now);
    }
    elapsed
}

/// Reap `FINISHED`/`TERMINATING`/`TERMINATED` instances whose pid has
/// actually exited, and re-send the kill signal to ones that overstayed
/// their kill deadline. `pid_alive` checks an OS pid; `mut kill` issues the
/// appropriate signal for an overstayed deadline (SIGKILL) and is only
/// invoked once per overstayed instance per sweep.
pub fn sweep_reap(
    table: &mut InstanceTable,
    now: u64,
    deadlines: &Deadlines,
    mut pid_alive: impl FnMut(u32) -> bool,
    mut kill: impl FnMut(u32),
) -> Vec<InstanceId> {
    let mut reaped = Vec::new();

    for id in table.finishing().collect::<Vec<_>>() {
        let Some(instance) = table.get(id) else { continue };
        let pid_gone = instance.pid.map_or(true, |pid| !pid_alive(pid));
        if pid_gone {
            let _ = table.apply(id, TransitionEvent::PidGone, now);
            reaped.push(id);
            continue;
        }
        let finished_at = instance.finished.unwrap_or(instance.started);
        if now.saturating_sub(finished_at) >= deadlines.finish_kill_deadline.as_millis() as u64 {
            if let Some(pid) = instance.pid {
                kill(pid);
            }
            let _ = table.apply(id, TransitionEvent::FinishKillDeadlineElapsed, now);
        }
    }

    for id in table.terminating().collect::<Vec<_>>() {
        let Some(instance) = table.get(id) else { continue };
        let pid_gone = instance.pid.map_or(true, |pid| !pid_alive(pid));
        if pid_gone {
            let _ = table.apply(id, TransitionEvent::PidGone, now);
            reaped.push(id);
            continue;
        }
        let since = instance.terminated.unwrap_or(instance.started);
        if now.saturating_sub(since) >= deadlines.term_kill_deadline.as_millis() as u64 {
            if let Some(pid) = instance.pid {
                kill(pid);
            }
            let _ = table.apply(id, TransitionEvent::TermKillDeadlineElapsed, now);
        }
    }

    reaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use procd_core::{Instance, InstanceId, Token, WorkerName};

    fn table_with_starting(started_at: u64) -> InstanceTable {
        let mut table = InstanceTable::default();
        let instance = Instance::new(InstanceId::new(1), WorkerName::parse("a").unwrap(), started_at, Token::generate());
        table.insert_starting(instance);
        table
    }

    #[test]
    fn start_deadline_elapsed_moves_to_terminating() {
        let mut table = table_with_starting(0);
        let deadlines = Deadlines::default();
        let now = deadlines.start_deadline.as_millis() as u64;
        let elapsed = sweep_start_deadline(&mut table, now, &deadlines);
        assert_eq!(elapsed, vec![InstanceId::new(1)]);
        assert_eq!(table.terminating().count(), 1);
    }

    #[test]
    fn start_deadline_not_yet_elapsed_is_untouched() {
        let mut table = table_with_starting(0);
        let deadlines = Deadlines::default();
        let elapsed = sweep_start_deadline(&mut table, 1, &deadlines);
        assert!(elapsed.is_empty());
        assert_eq!(table.starting().count(), 1);
    }

    #[test]
    fn reap_drops_finished_instance_whose_pid_is_gone() {
        let mut table = table_with_starting(0);
        table.apply(InstanceId::new(1), procd_core::TransitionEvent::Registered, 1).unwrap();
        table.apply(InstanceId::new(1), procd_core::TransitionEvent::Finished, 2).unwrap();
        let deadlines = Deadlines::default();
        let reaped = sweep_reap(&mut table, 3, &deadlines, |_pid| false, |_pid| {});
        assert_eq!(reaped, vec![InstanceId::new(1)]);
        assert!(table.is_empty());
    }
}
