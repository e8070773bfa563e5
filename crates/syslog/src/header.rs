//! Header field parsing: PRIVAL, VERSION, and the five `SP`-delimited
//! TIMESTAMP/HOST/APP/PROCID/MSGID fields.

use crate::ParseError;

/// Parsed header record. `"-"` fields are represented as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub prival: u16,
    pub version: u16,
    pub timestamp: Option<String>,
    pub hostname: Option<String>,
    pub appname: Option<String>,
    pub procid: Option<String>,
    pub msgid: Option<String>,
}

/// Consume `<NNN>` from the front of the cursor, returning the prival.
pub(crate) fn take_prival<'a>(cursor: &mut &'a [u8]) -> Result<u16, ParseError> {
    let rest = cursor.strip_prefix(b"<").ok_or(ParseError::MalformedPrival)?;
    let close = rest.iter().position(|&b| b == b'>').ok_or(ParseError::MalformedPrival)?;
    let digits = &rest[..close];
    let prival: u16 =
        std::str::from_utf8(digits).ok().and_then(|s| s.parse().ok()).ok_or(ParseError::MalformedPrival)?;
    *cursor = &rest[close + 1..];
    Ok(prival)
}

/// Consume the VERSION token, which attaches directly to PRIVAL with no
/// separating space and ends at the next SP.
pub(crate) fn take_token<'a>(
    cursor: &mut &'a [u8],
    field: &'static str,
) -> Result<&'a [u8], ParseError> {
    let end = cursor.iter().position(|&b| b == b' ').unwrap_or(cursor.len());
    if end == 0 {
        return Err(ParseError::MissingField(field));
    }
    let token = &cursor[..end];
    *cursor = &cursor[end..];
    Ok(token)
}

/// Consume a single leading SP then a whitespace-delimited field token,
/// validating its length range and that every byte is printable ASCII
/// (`0x21..=0x7E`).
pub(crate) fn take_field<'a>(
    cursor: &mut &'a [u8],
    field: &'static str,
    min: usize,
    max: usize,
) -> Result<&'a [u8], ParseError> {
    *cursor = cursor.strip_prefix(b" ").ok_or(ParseError::MissingField(field))?;
    let token = take_token(cursor, field)?;
    if token.len() < min || token.len() > max {
        return Err(ParseError::FieldLength { field, len: token.len(), min, max });
    }
    if !token.iter().all(|&b| (0x21..=0x7E).contains(&b)) {
        return Err(ParseError::NonPrintableAscii { field });
    }
    Ok(token)
}

/// Convert a raw field token to `None` when it is the `"-"` absent marker.
pub(crate) fn absent_or(token: &[u8]) -> Option<String> {
    if token == b"-" {
        None
    } else {
        Some(String::from_utf8_lossy(token).into_owned())
    }
}
