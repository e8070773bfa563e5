//! Identifier types: instance ids, worker names, and one-shot registration tokens.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Monotonically increasing instance identifier, assigned by the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u64);

impl InstanceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised while validating a worker name against the dot-segment grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidName {
    #[error("worker name is empty")]
    Empty,
    #[error("worker name has a leading or trailing dot: {0:?}")]
    LeadingOrTrailingDot(String),
    #[error("worker name has an empty segment: {0:?}")]
    EmptySegment(String),
    #[error("segment {segment:?} does not start with an alphanumeric character")]
    SegmentStart { segment: String },
    #[error("segment {segment:?} contains a character outside [A-Za-z0-9_]")]
    SegmentChar { segment: String },
}

/// Dot-separated worker identifier, validated against the Catalogue grammar.
///
/// Each segment must start with an alphanumeric character and continue with
/// alphanumerics or underscores; the name may not start or end with a dot,
/// and no segment may be empty (which also rules out `..` path traversal).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerName(String);

impl WorkerName {
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidName> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidName::Empty);
        }
        if s.starts_with('.') || s.ends_with('.') {
            return Err(InvalidName::LeadingOrTrailingDot(s));
        }
        for segment in s.split('.') {
            if segment.is_empty() {
                return Err(InvalidName::EmptySegment(s));
            }
            let mut chars = segment.chars();
            let first = chars.next().expect("segment is non-empty");
            if !first.is_ascii_alphanumeric() {
                return Err(InvalidName::SegmentStart { segment: segment.to_string() });
            }
            if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(InvalidName::SegmentChar { segment: segment.to_string() });
            }
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments, leaf-last.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl TryFrom<String> for WorkerName {
    type Error = InvalidName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<WorkerName> for String {
    fn from(value: WorkerName) -> Self {
        value.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for WorkerName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for WorkerName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// One-shot registration secret: 12 random bytes, hex-encoded (24 characters).
///
/// Issued when an instance enters `STARTING` and passed to the child as an
/// argument; deleted from the Instance Table on successful registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Generate a fresh token from 12 bytes of a random UUID's entropy.
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4();
        let raw = bytes.as_bytes();
        let mut hex = String::with_capacity(24);
        for byte in &raw[..12] {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are secrets: never print their value, even in debug output.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_segments() {
        assert!(WorkerName::parse("ftp.download").is_ok());
        assert!(WorkerName::parse("a1.b_2.c3").is_ok());
    }

    #[test]
    fn rejects_leading_dot() {
        assert_eq!(
            WorkerName::parse(".hidden"),
            Err(InvalidName::LeadingOrTrailingDot(".hidden".into()))
        );
    }

    #[test]
    fn rejects_empty_segment_including_traversal() {
        assert!(matches!(WorkerName::parse("a..b"), Err(InvalidName::EmptySegment(_))));
    }

    #[test]
    fn rejects_segment_starting_with_underscore() {
        assert!(matches!(WorkerName::parse("_foo"), Err(InvalidName::SegmentStart { .. })));
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(matches!(WorkerName::parse("foo-bar"), Err(InvalidName::SegmentChar { .. })));
    }

    #[test]
    fn tokens_are_24_hex_chars_and_unique() {
        let a = Token::generate();
        let b = Token::generate();
        assert_eq!(a.as_str().len(), 24);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn token_debug_never_leaks_value() {
        let t = Token::generate();
        assert_eq!(format!("{t:?}"), "Token(..)");
    }
}
