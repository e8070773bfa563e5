// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The Supervisor Core's state: the Instance Table (lifecycle + indices),
//! the Monitor Registry (subscription fan-out), and the periodic deadline
//! sweeps that drive both.

mod instance_table;
mod monitor_registry;
mod timers;

pub use instance_table::{ApplyError, InstanceTable, UnknownInstance};
pub use monitor_registry::{MonitorRegistry, PeerId};
pub use timers::{sweep_reap, sweep_start_deadline, sweep_work_deadline};
