//! `STRUCTURED-DATA := "-" | element+` parsing and re-serialization.
//!
//! `element := "[" ID (SP param)* "]"`, `param := name "=" "\"" value "\""`.
//! The value alphabet escapes `"`, `\`, `]` via backslash.

use crate::ParseError;
use std::collections::BTreeMap;

pub type Element = BTreeMap<String, String>;

/// Element-id → (param-name → value). Ordered so that serialization is
/// deterministic for round-trip tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredData(BTreeMap<String, Element>);

impl StructuredData {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, id: String, element: Element) {
        self.0.insert(id, element);
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.0.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Element)> {
        self.0.iter()
    }
}

fn validate_id(field: &'static str, s: &str) -> Result<(), ParseError> {
    if s.is_empty() || s.len() > 32 {
        return Err(ParseError::FieldLength { field, len: s.len(), min: 1, max: 32 });
    }
    if !s.bytes().all(|b| (0x21..=0x7E).contains(&b)) {
        return Err(ParseError::NonPrintableAscii { field });
    }
    Ok(())
}

pub(crate) fn parse(cursor: &mut &[u8]) -> Result<StructuredData, ParseError> {
    *cursor = cursor.strip_prefix(b" ").ok_or(ParseError::MissingField("STRUCTURED-DATA"))?;
    if let Some(rest) = cursor.strip_prefix(b"-") {
        *cursor = rest;
        return consume_trailing_space(cursor);
    }

    let mut data = StructuredData::default();
    while cursor.first() == Some(&b'[') {
        let (id, element, remainder) = parse_element(*cursor)?;
        validate_id("SD-ID", &id)?;
        if data.0.contains_key(&id) {
            return Err(ParseError::DuplicateElement(id));
        }
        data.0.insert(id, element);
        *cursor = remainder;
    }
    if data.0.is_empty() {
        return Err(ParseError::MalformedStructuredData);
    }
    consume_trailing_space(cursor)?;
    Ok(data)
}

/// Consume the single SP separating STRUCTURED-DATA from an optional MSG, if
/// present. If the line ends here there is no message.
fn consume_trailing_space(cursor: &mut &[u8]) -> Result<StructuredData, ParseError> {
    if cursor.is_empty() {
        return Ok(StructuredData::default());
    }
    *cursor = cursor.strip_prefix(b" ").ok_or(ParseError::MalformedStructuredData)?;
    Ok(StructuredData::default())
}

fn parse_element(input: &[u8]) -> Result<(String, Element, &[u8]), ParseError> {
    let rest = input.strip_prefix(b"[").ok_or(ParseError::MalformedStructuredData)?;
    let id_end = rest
        .iter()
        .position(|&b| b == b' ' || b == b']')
        .ok_or(ParseError::MalformedStructuredData)?;
    let id = std::str::from_utf8(&rest[..id_end])
        .map_err(|_| ParseError::MalformedStructuredData)?
        .to_string();
    let mut cursor = &rest[id_end..];
    let mut element = Element::default();
    loop {
        if let Some(after) = cursor.strip_prefix(b"]") {
            return Ok((id, element, after));
        }
        cursor = cursor.strip_prefix(b" ").ok_or(ParseError::MalformedStructuredData)?;
        let eq = cursor.iter().position(|&b| b == b'=').ok_or(ParseError::MalformedStructuredData)?;
        let name = std::str::from_utf8(&cursor[..eq])
            .map_err(|_| ParseError::MalformedStructuredData)?
            .to_string();
        validate_id("SD-PARAM", &name)?;
        cursor = &cursor[eq + 1..];
        cursor = cursor.strip_prefix(b"\"").ok_or(ParseError::MalformedStructuredData)?;
        let (value, after_value) = parse_quoted_value(cursor)?;
        cursor = after_value;
        if element.contains_key(&name) {
            return Err(ParseError::DuplicateParam(name));
        }
        element.insert(name, value);
    }
}

fn parse_quoted_value(input: &[u8]) -> Result<(String, &[u8]), ParseError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'"' => return Ok((String::from_utf8_lossy(&out).into_owned(), &input[i + 1..])),
            b'\\' if i + 1 < input.len() && matches!(input[i + 1], b'"' | b'\\' | b']') => {
                out.push(input[i + 1]);
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Err(ParseError::MalformedStructuredData)
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub(crate) fn format(data: &StructuredData) -> String {
    if data.is_empty() {
        return "-".to_string();
    }
    let mut out = String::new();
    for (id, element) in data.iter() {
        out.push('[');
        out.push_str(id);
        for (name, value) in element {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_value(value));
            out.push('"');
        }
        out.push(']');
    }
    out
}
