//! PUBLISH payload kinds.

use std::borrow::Cow;

use crate::error::ProtocolError;

/// Body of a PUBLISH.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Sent verbatim.
    Bytes(&'a [u8]),
    /// Sent as UTF-8.
    Text(&'a str),
    /// Map or sequence, serialised to compact JSON with keys sorted.
    Structured(&'a serde_json::Value),
}

impl<'a> Payload<'a> {
    pub fn to_wire(&self) -> Result<Cow<'a, [u8]>, ProtocolError> {
        match *self {
            Self::Bytes(b) => Ok(Cow::Borrowed(b)),
            Self::Text(s) => Ok(Cow::Borrowed(s.as_bytes())),
            // `serde_json::Map` is BTreeMap-backed here, so keys come out sorted.
            Self::Structured(v) => serde_json::to_vec(v)
                .map(Cow::Owned)
                .map_err(|_| ProtocolError::PayloadEncoding),
        }
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(s: &'a str) -> Self {
        Self::Text(s)
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(b: &'a [u8]) -> Self {
        Self::Bytes(b)
    }
}

impl<'a> From<&'a serde_json::Value> for Payload<'a> {
    fn from(v: &'a serde_json::Value) -> Self {
        Self::Structured(v)
    }
}
