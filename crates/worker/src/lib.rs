// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The Worker Runtime's process: startup guard, output capture, and the
//! register/update/finish lifecycle against the Supervisor Core.

pub mod pidfile;
pub mod runtime;

pub use runtime::{run, WorkerArgs};
