// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! IPC protocol for Supervisor Core communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, usable
//! over both the network client endpoint and the local worker endpoint.

mod codec;
mod request;
mod response;
mod worker_command;

pub use codec::{decode, encode, read_message, read_value, write_message, write_value, ProtocolError};
pub use request::{subscribe_request, Request};
pub use response::{MonitorEvent, Response, RpcError};
pub use worker_command::WorkerCommand;

/// Major.minor protocol version string exchanged in the `hello` handshake.
/// Mismatched major versions are rejected by the Supervisor Core.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Parse a `"<major>.<minor>"` version string's major component.
pub fn protocol_major(version: &str) -> Option<u32> {
    version.split('.').next()?.parse().ok()
}

/// Whether `their_version` is compatible with [`PROTOCOL_VERSION`] (same
/// major version).
pub fn is_compatible(their_version: &str) -> bool {
    match (protocol_major(their_version), protocol_major(PROTOCOL_VERSION)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_major_version_is_compatible() {
        assert!(is_compatible("1.7"));
    }

    #[test]
    fn different_major_version_is_incompatible() {
        assert!(!is_compatible("2.0"));
    }

    #[test]
    fn malformed_version_is_incompatible() {
        assert!(!is_compatible("not-a-version"));
    }
}
