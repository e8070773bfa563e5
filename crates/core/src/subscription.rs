//! Monitor subscription types shared between the engine (fan-out) and wire
//! (RPC request/response) crates.

use crate::id::{InstanceId, WorkerName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two subscription flavors. REALTIME additionally receives raw output
/// buffers and drives the fast heartbeat cadence on the Worker Runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorType {
    Progress,
    Realtime,
}

/// What a subscription is watching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionTarget {
    Instance(InstanceId),
    Worker(WorkerName),
    All,
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionTarget::Instance(id) => write!(f, "instance:{id}"),
            SubscriptionTarget::Worker(name) => write!(f, "worker:{name}"),
            SubscriptionTarget::All => write!(f, "*"),
        }
    }
}

/// Rejects a subscription request that violates §3's subscription invariant:
/// REALTIME is not permitted with `target == "*"`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("realtime subscriptions are not permitted against the wildcard target")]
pub struct RealtimeWildcardRejected;

/// Validate a `(monitor_type, target)` pair against the subscription
/// invariant before the caller constructs a `Subscription`.
pub fn validate_subscription(
    monitor_type: MonitorType,
    target: &SubscriptionTarget,
) -> Result<(), RealtimeWildcardRejected> {
    if monitor_type == MonitorType::Realtime && *target == SubscriptionTarget::All {
        return Err(RealtimeWildcardRejected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_all_is_rejected() {
        assert!(validate_subscription(MonitorType::Realtime, &SubscriptionTarget::All).is_err());
    }

    #[test]
    fn progress_all_is_allowed() {
        assert!(validate_subscription(MonitorType::Progress, &SubscriptionTarget::All).is_ok());
    }

    #[test]
    fn realtime_instance_is_allowed() {
        let target = SubscriptionTarget::Instance(InstanceId::new(1));
        assert!(validate_subscription(MonitorType::Realtime, &target).is_ok());
    }
}
