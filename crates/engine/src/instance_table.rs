//! The Instance Table: every live instance plus the per-state indices the
//! timer tasks scan, kept in lockstep with `Instance.state` on every
//! transition.

use indexmap::IndexSet;
use procd_core::{transition, Instance, InstanceId, InstanceState, InvalidTransition, TransitionEvent, WorkerName};
use std::collections::HashMap;

/// Error returned when a caller asks for an instance that isn't live.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance: {0}")]
pub struct UnknownInstance(pub InstanceId);

/// Live instances plus the indices the periodic timer tasks scan: instances
/// awaiting registration, registered (running) instances, instances that
/// finished but whose pid hasn't exited yet, and instances being terminated.
#[derive(Default)]
pub struct InstanceTable {
    instances: HashMap<InstanceId, Instance>,
    starting: IndexSet<InstanceId>,
    registered: IndexSet<InstanceId>,
    finishing: IndexSet<InstanceId>,
    terminating: IndexSet<InstanceId>,
    /// name → the single non-terminal instance running it, if any. Used to
    /// reject `run` while an instance of the same worker is already live.
    running_by_name: HashMap<WorkerName, InstanceId>,
}

impl InstanceTable {
    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    /// Direct mutable access for fields the transition graph doesn't own
    /// (`pid`, `progress`, `updated`). Never assign `.state` through this —
    /// that would desync the per-state indices; go through [`apply`] instead.
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    pub fn running_instance_of(&self, name: &WorkerName) -> Option<InstanceId> {
        self.running_by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn starting(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.starting.iter().copied()
    }

    pub fn registered(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.registered.iter().copied()
    }

    pub fn finishing(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.finishing.iter().copied()
    }

    pub fn terminating(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.terminating.iter().copied()
    }

    /// Insert a brand-new instance in `STARTING`. Its token (embedded in
    /// `Instance.token` by `Instance::new`) is consumed by the first call to
    /// [`check_and_consume_token`].
    pub fn insert_starting(&mut self, instance: Instance) {
        let id = instance.id;
        let name = instance.name.clone();
        self.starting.insert(id);
        self.running_by_name.insert(name, id);
        self.instances.insert(id, instance);
    }

    /// Check a presented registration token against the one issued at
    /// `run()` time. Consumed (cleared) on success or failure alike — it is
    /// one-shot regardless of outcome.
    pub fn check_and_consume_token(&mut self, id: InstanceId, presented: &str) -> bool {
        let Some(instance) = self.instances.get_mut(&id) else {
            return false;
        };
        match instance.token.take() {
            Some(expected) => expected.as_str() == presented,
            None => false,
        }
    }

    /// Apply a lifecycle event, updating indices to match the new state.
    /// Returns the resulting state, or rejects the transition without
    /// mutating anything.
    pub fn apply(&mut self, id: InstanceId, event: TransitionEvent, now: u64) -> Result<InstanceState, ApplyError> {
        let instance = self.instances.get_mut(&id).ok_or(ApplyError::Unknown(UnknownInstance(id)))?;
        let prev_state = instance.state;
        let next = transition(prev_state, event)?;
        self.remove_from_index(id, prev_state);
        let instance = self.instances.get_mut(&id).ok_or(ApplyError::Unknown(UnknownInstance(id)))?;
        instance.state = next;
        stamp_timestamp(instance, next, now);
        let name = instance.name.clone();
        self.insert_into_index(id, next);
        if next == InstanceState::NotRunning {
            self.running_by_name.remove(&name);
            let removed = self.instances.remove(&id);
            return Ok(removed.map(|i| i.state).unwrap_or(next));
        }
        Ok(next)
    }

    fn remove_from_index(&mut self, id: InstanceId, state: InstanceState) {
        match state {
            InstanceState::Starting => {
                self.starting.shift_remove(&id);
            }
            InstanceState::Working => {
                self.registered.shift_remove(&id);
            }
            InstanceState::Finished => {
                self.finishing.shift_remove(&id);
            }
            InstanceState::Terminating | InstanceState::Terminated => {
                self.terminating.shift_remove(&id);
            }
            _ => {}
        }
    }

    fn insert_into_index(&mut self, id: InstanceId, state: InstanceState) {
        match state {
            InstanceState::Starting => {
                self.starting.insert(id);
            }
            InstanceState::Working => {
                self.registered.insert(id);
            }
            InstanceState::Finished => {
                self.finishing.insert(id);
            }
            InstanceState::Terminating | InstanceState::Terminated => {
                self.terminating.insert(id);
            }
            _ => {}
        }
    }
}

fn stamp_timestamp(instance: &mut Instance, state: InstanceState, now: u64) {
    match state {
        InstanceState::Working => instance.registered = Some(now),
        InstanceState::Finished => instance.finished = Some(now),
        InstanceState::Terminated => instance.terminated = Some(now),
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Unknown(#[from] UnknownInstance),
    #[error(transparent)]
    Invalid(#[from] InvalidTransition),
}

#[cfg(test)]
mod tests {
    use super::*;
    use procd_core::{Token, WorkerName};

    fn instance(id: u64, name: &str) -> Instance {
        Instance::new(InstanceId::new(id), WorkerName::parse(name).unwrap(), 0, Token::generate())
    }

    #[test]
    fn insert_then_register_moves_between_indices() {
        let mut table = InstanceTable::default();
        table.insert_starting(instance(1, "a"));
        assert!(table.starting().any(|i| i.0 == 1));

        let state = table.apply(InstanceId::new(1), TransitionEvent::Registered, 10).unwrap();
        assert_eq!(state, InstanceState::Working);
        assert!(!table.starting().any(|i| i.0 == 1));
        assert!(table.registered().any(|i| i.0 == 1));
        assert_eq!(table.get(InstanceId::new(1)).unwrap().registered, Some(10));
    }

    #[test]
    fn reaching_not_running_drops_the_row_and_name_claim() {
        let mut table = InstanceTable::default();
        let name = WorkerName::parse("a").unwrap();
        table.insert_starting(instance(1, "a"));
        table.apply(InstanceId::new(1), TransitionEvent::StartDeadlineElapsed, 1).unwrap();
        table.apply(InstanceId::new(1), TransitionEvent::PidGone, 2).unwrap();
        assert!(table.is_empty());
        assert!(table.running_instance_of(&name).is_none());
    }

    #[test]
    fn token_is_consumed_on_first_check() {
        let mut table = InstanceTable::default();
        let inst = instance(1, "a");
        let token = inst.token.as_ref().unwrap().as_str().to_string();
        table.insert_starting(inst);
        assert!(table.check_and_consume_token(InstanceId::new(1), &token));
        assert!(!table.check_and_consume_token(InstanceId::new(1), &token));
    }

    #[test]
    fn unknown_instance_is_rejected() {
        let mut table = InstanceTable::default();
        let err = table.apply(InstanceId::new(99), TransitionEvent::Registered, 0).unwrap_err();
        assert!(matches!(err, ApplyError::Unknown(_)));
    }
}
