// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! An RFC-5424-flavored structured-log line parser.
//!
//! Parses a single line of the form:
//!
//! ```text
//! <PRIVAL>VERSION SP TIMESTAMP SP HOST SP APP SP PROCID SP MSGID SP STRUCTURED-DATA [SP MSG]
//! ```
//!
//! into a [`Header`], a [`StructuredData`] map, and an optional message tail.
//! There is no partial recovery: any grammar or field-length violation
//! rejects the whole line.

mod header;
mod message;
mod structured_data;

pub use header::Header;
pub use message::Message;
pub use structured_data::{Element, StructuredData};

use thiserror::Error;

/// A fully parsed syslog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub structured_data: StructuredData,
    pub message: Option<Message>,
}

/// Errors rejecting a malformed line. No partial recovery is attempted:
/// any of these rejects the line as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line is empty")]
    Empty,
    #[error("missing or malformed PRIVAL")]
    MalformedPrival,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("field {field} length {len} is outside the allowed range {min}..={max}")]
    FieldLength { field: &'static str, len: usize, min: usize, max: usize },
    #[error("field {field} contains a non-printable-ASCII byte")]
    NonPrintableAscii { field: &'static str },
    #[error("malformed structured data")]
    MalformedStructuredData,
    #[error("duplicate structured-data element id {0:?}")]
    DuplicateElement(String),
    #[error("duplicate parameter name {0:?} within element")]
    DuplicateParam(String),
}

/// Parse a single syslog line per the module-level grammar.
pub fn parse(line: &[u8]) -> Result<Record, ParseError> {
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut cursor = line;
    let prival = header::take_prival(&mut cursor)?;
    let version = header::take_token(&mut cursor, "VERSION")?;
    let version: u16 = std::str::from_utf8(version)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::MalformedPrival)?;
    let timestamp = header::take_field(&mut cursor, "TIMESTAMP", 1, usize::MAX)?;
    let hostname = header::take_field(&mut cursor, "HOST", 1, 255)?;
    let appname = header::take_field(&mut cursor, "APP", 1, 48)?;
    let procid = header::take_field(&mut cursor, "PROCID", 1, 128)?;
    let msgid = header::take_field(&mut cursor, "MSGID", 1, 32)?;

    let header = Header {
        prival,
        version,
        timestamp: header::absent_or(timestamp),
        hostname: header::absent_or(hostname),
        appname: header::absent_or(appname),
        procid: header::absent_or(procid),
        msgid: header::absent_or(msgid),
    };

    let structured_data = structured_data::parse(&mut cursor)?;

    let message = if cursor.is_empty() {
        None
    } else {
        // Leading separator space before MSG has already been consumed by
        // structured_data::parse; whatever remains is the message tail.
        Some(message::parse(cursor))
    };

    Ok(Record { header, structured_data, message })
}

/// Serialize a [`Record`] back to wire format (used by the worker runtime to
/// emit progress lines, and by round-trip tests).
pub fn format(record: &Record) -> String {
    let mut out = String::new();
    out.push_str(&format!("<{}>{}", record.header.prival, record.header.version));
    for field in [
        &record.header.timestamp,
        &record.header.hostname,
        &record.header.appname,
        &record.header.procid,
        &record.header.msgid,
    ] {
        out.push(' ');
        out.push_str(field.as_deref().unwrap_or("-"));
    }
    out.push(' ');
    out.push_str(&structured_data::format(&record.structured_data));
    if let Some(msg) = &record.message {
        out.push(' ');
        out.push_str(&message::format(msg));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn parses_a_full_line_with_structured_data_and_message() {
        let line = br#"<134>1 2026-08-01T00:00:00Z host.example worker 4242 status [status@ridersdiscount progress="0.333"] hello"#;
        let rec = parse(line).unwrap();
        assert_eq!(rec.header.prival, 134);
        assert_eq!(rec.header.version, 1);
        assert_eq!(rec.header.appname.as_deref(), Some("worker"));
        assert_eq!(rec.header.msgid.as_deref(), Some("status"));
        let elem = rec.structured_data.get("status@ridersdiscount").unwrap();
        assert_eq!(elem.get("progress").map(|s| s.as_str()), Some("0.333"));
        assert_eq!(rec.message.as_ref().unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn dash_fields_are_absent() {
        let line = b"<14>1 - - - - - -";
        let rec = parse(line).unwrap();
        assert!(rec.header.timestamp.is_none());
        assert!(rec.header.hostname.is_none());
        assert!(rec.structured_data.is_empty());
        assert!(rec.message.is_none());
    }

    #[test]
    fn rejects_hostname_over_255_bytes() {
        let long = "h".repeat(256);
        let line = format!("<14>1 - {long} app 1 msg -");
        assert!(matches!(
            parse(line.as_bytes()),
            Err(ParseError::FieldLength { field: "HOST", .. })
        ));
    }

    #[test]
    fn rejects_empty_line() {
        assert_eq!(parse(b""), Err(ParseError::Empty));
    }

    #[test]
    fn rejects_duplicate_element_ids() {
        let line = br#"<14>1 - - - - - [a x="1"][a y="2"]"#;
        assert_eq!(parse(line), Err(ParseError::DuplicateElement("a".into())));
    }

    #[test]
    fn round_trips_through_format_and_parse() {
        let line = br#"<134>1 2026-08-01T00:00:00Z host app 1 status [status@ridersdiscount progress="1.000"] done"#;
        let rec = parse(line).unwrap();
        let rebuilt = format(&rec);
        let rec2 = parse(rebuilt.as_bytes()).unwrap();
        assert_eq!(rec, rec2);
    }

    #[test]
    fn escaped_characters_in_param_values_round_trip() {
        let mut elem = BTreeMap::new();
        elem.insert("msg".to_string(), r#"has "quote" and \backslash and ] bracket"#.to_string());
        let mut sd = StructuredData::default();
        sd.insert("x".to_string(), elem);
        let rec = Record {
            header: Header {
                prival: 14,
                version: 1,
                timestamp: None,
                hostname: None,
                appname: None,
                procid: None,
                msgid: None,
            },
            structured_data: sd,
            message: None,
        };
        let line = format(&rec);
        let parsed = parse(line.as_bytes()).unwrap();
        assert_eq!(parsed.structured_data, rec.structured_data);
    }
}
