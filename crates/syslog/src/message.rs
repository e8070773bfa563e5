//! The free-form MSG tail: UTF-8 if BOM-prefixed, otherwise opaque bytes.

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// The message tail of a syslog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Vec<u8>,
    had_bom: bool,
}

impl Message {
    /// Whether the producer marked this message as UTF-8 with a leading BOM.
    pub fn had_bom(&self) -> bool {
        self.had_bom
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Best-effort UTF-8 view of the message body (BOM stripped). Returns
    /// `None` if the bytes are not valid UTF-8, which is expected for
    /// non-BOM-prefixed binary payloads.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

pub(crate) fn parse(input: &[u8]) -> Message {
    if let Some(rest) = input.strip_prefix(&UTF8_BOM) {
        Message { bytes: rest.to_vec(), had_bom: true }
    } else {
        Message { bytes: input.to_vec(), had_bom: false }
    }
}

pub(crate) fn format(message: &Message) -> String {
    let mut out = Vec::new();
    if message.had_bom {
        out.extend_from_slice(&UTF8_BOM);
    }
    out.extend_from_slice(&message.bytes);
    String::from_utf8_lossy(&out).into_owned()
}
