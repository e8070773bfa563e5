//! The Monitor Registry: fan-out from instance/worker lifecycle events to
//! subscribed peers.
//!
//! A peer is represented by a `(PeerId, UnboundedSender<MonitorEvent>)` pair
//! rather than a trait object, mirroring the plain mpsc channels the rest of
//! this codebase uses for internal event plumbing. The registry only owns
//! subscription bookkeeping and fan-out; the catch-up message sent
//! immediately on subscribe is the caller's responsibility, since only the
//! caller (holding the Instance Table) knows the current state to send.

use procd_core::{validate_subscription, InstanceId, MonitorType, RealtimeWildcardRejected, SubscriptionTarget, WorkerName};
use procd_wire::MonitorEvent;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// Opaque identifier for a subscribed peer, assigned by the caller (e.g. a
/// connection id). Used to remove exactly the right subscription on
/// unsubscribe, since one peer may hold several subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u64);

struct Subscriber {
    peer: PeerId,
    monitor_type: MonitorType,
    tx: UnboundedSender<MonitorEvent>,
}

#[derive(Default)]
pub struct MonitorRegistry {
    by_instance: HashMap<InstanceId, Vec<Subscriber>>,
    by_worker: HashMap<WorkerName, Vec<Subscriber>>,
    wildcard: Vec<Subscriber>,
}

impl MonitorRegistry {
    pub fn subscribe(
        &mut self,
        peer: PeerId,
        target: SubscriptionTarget,
        monitor_type: MonitorType,
        tx: UnboundedSender<MonitorEvent>,
    ) -> Result<(), RealtimeWildcardRejected> {
        validate_subscription(monitor_type, &target)?;
        let subscriber = Subscriber { peer, monitor_type, tx };
        match target {
            SubscriptionTarget::Instance(id) => self.by_instance.entry(id).or_default().push(subscriber),
            SubscriptionTarget::Worker(name) => self.by_worker.entry(name).or_default().push(subscriber),
            SubscriptionTarget::All => self.wildcard.push(subscriber),
        }
        Ok(())
    }

    pub fn unsubscribe(&mut self, peer: PeerId, target: &SubscriptionTarget) {
        match target {
            SubscriptionTarget::Instance(id) => {
                if let Some(subs) = self.by_instance.get_mut(id) {
                    subs.retain(|s| s.peer != peer);
                }
            }
            SubscriptionTarget::Worker(name) => {
                if let Some(subs) = self.by_worker.get_mut(name) {
                    subs.retain(|s| s.peer != peer);
                }
            }
            SubscriptionTarget::All => self.wildcard.retain(|s| s.peer != peer),
        }
    }

    /// Drop every subscription held by `peer`, regardless of target. Called
    /// when a peer's transport is observed dead.
    pub fn drop_peer(&mut self, peer: PeerId) {
        for subs in self.by_instance.values_mut() {
            subs.retain(|s| s.peer != peer);
        }
        for subs in self.by_worker.values_mut() {
            subs.retain(|s| s.peer != peer);
        }
        self.wildcard.retain(|s| s.peer != peer);
    }

    /// Fan an event out to every subscriber of `id` and `name`, plus the
    /// wildcard subscribers if the event is a PROGRESS-class event (the
    /// wildcard never carries REALTIME subscribers per the subscription
    /// invariant, so no filtering is needed there).
    pub fn fan_out(&mut self, id: InstanceId, name: &WorkerName, event: &MonitorEvent) {
        let mut dead = Vec::new();
        if let Some(subs) = self.by_instance.get(&id) {
            for sub in subs {
                if sub.tx.send(event.clone()).is_err() {
                    dead.push((Some(id), None, sub.peer));
                }
            }
        }
        if let Some(subs) = self.by_worker.get(name) {
            for sub in subs {
                if sub.tx.send(event.clone()).is_err() {
                    dead.push((None, Some(name.clone()), sub.peer));
                }
            }
        }
        for sub in &self.wildcard {
            if sub.tx.send(event.clone()).is_err() {
                dead.push((None, None, sub.peer));
            }
        }
        for (id, name, peer) in dead {
            match (id, name) {
                (Some(id), _) => {
                    if let Some(subs) = self.by_instance.get_mut(&id) {
                        subs.retain(|s| s.peer != peer);
                    }
                }
                (_, Some(name)) => {
                    if let Some(subs) = self.by_worker.get_mut(&name) {
                        subs.retain(|s| s.peer != peer);
                    }
                }
                _ => self.wildcard.retain(|s| s.peer != peer),
            }
        }
    }

    pub fn instance_subscriber_count(&self, id: InstanceId) -> usize {
        self.by_instance.get(&id).map_or(0, Vec::len)
    }

    pub fn realtime_subscribed(&self, id: InstanceId, name: &WorkerName) -> bool {
        let instance_realtime = self
            .by_instance
            .get(&id)
            .is_some_and(|subs| subs.iter().any(|s| s.monitor_type == MonitorType::Realtime));
        let worker_realtime = self
            .by_worker
            .get(name)
            .is_some_and(|subs| subs.iter().any(|s| s.monitor_type == MonitorType::Realtime));
        instance_realtime || worker_realtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn realtime_against_wildcard_is_rejected() {
        let mut registry = MonitorRegistry::default();
        let (tx, _rx) = unbounded_channel();
        let err = registry
            .subscribe(PeerId(1), SubscriptionTarget::All, MonitorType::Realtime, tx)
            .unwrap_err();
        let _ = err;
    }

    #[test]
    fn fan_out_reaches_instance_and_worker_subscribers() {
        let mut registry = MonitorRegistry::default();
        let name = WorkerName::parse("ftp.download").unwrap();
        let id = InstanceId::new(1);
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        registry.subscribe(PeerId(1), SubscriptionTarget::Instance(id), MonitorType::Progress, tx1).unwrap();
        registry
            .subscribe(PeerId(2), SubscriptionTarget::Worker(name.clone()), MonitorType::Progress, tx2)
            .unwrap();

        registry.fan_out(id, &name, &MonitorEvent::MonitorWorking { id });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn dropping_a_peer_removes_all_its_subscriptions() {
        let mut registry = MonitorRegistry::default();
        let id = InstanceId::new(1);
        let (tx, _rx) = unbounded_channel();
        registry.subscribe(PeerId(1), SubscriptionTarget::Instance(id), MonitorType::Progress, tx).unwrap();
        registry.drop_peer(PeerId(1));
        assert_eq!(registry.instance_subscriber_count(id), 0);
    }

    #[test]
    fn a_closed_channel_is_pruned_on_next_fan_out() {
        let mut registry = MonitorRegistry::default();
        let name = WorkerName::parse("a").unwrap();
        let id = InstanceId::new(1);
        let (tx, rx) = unbounded_channel();
        registry.subscribe(PeerId(1), SubscriptionTarget::Instance(id), MonitorType::Progress, tx).unwrap();
        drop(rx);
        registry.fan_out(id, &name, &MonitorEvent::MonitorWorking { id });
        assert_eq!(registry.instance_subscriber_count(id), 0);
    }
}
