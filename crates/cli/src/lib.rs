//! `procctl`: a thin RPC client for the Supervisor Core's client-facing
//! surface (worker listing/queries, run/terminate, monitor subscriptions).

pub mod client;
pub mod commands;
pub mod output;
