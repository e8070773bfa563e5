// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! procd-core: shared domain types for the process supervisor.
//!
//! Identifiers, the worker descriptor, the instance lifecycle state machine,
//! subscription types, and deadline configuration all live here so that the
//! wire, storage, and engine crates share one vocabulary.

pub mod clock;
pub mod deadlines;
pub mod descriptor;
pub mod id;
pub mod instance;
pub mod macros;
pub mod subscription;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use deadlines::Deadlines;
pub use descriptor::{WorkerDescriptor, WorkerKind};
pub use id::{InstanceId, InvalidName, Token, WorkerName};
pub use instance::{transition, Instance, InstanceState, InvalidTransition, TransitionEvent};
pub use subscription::{
    validate_subscription, MonitorType, RealtimeWildcardRejected, SubscriptionTarget,
};
