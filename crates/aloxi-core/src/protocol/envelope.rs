//! Envelope (JSON) and the inbound decode filter.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AloxiError, Result};

/// Protocol family tag carried in the `type` field.
pub const PROTOCOL_TAG: &str = "aloxiComm";

/// Envelope exchanged over the pub/sub channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol family (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Handler selector.
    pub operation: String,
    /// Opaque payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope of the Aloxi protocol family.
    pub fn new(operation: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: PROTOCOL_TAG.to_string(),
            operation: operation.into(),
            data,
        }
    }

    /// Payload as a string, if it is one.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_str()
    }

    /// Serialize to UTF-8 JSON bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| AloxiError::Internal(format!("envelope encode failed: {e}")))
    }
}

/// Why an inbound frame was dropped before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Not a JSON object.
    InvalidJson(String),
    /// `type` absent or belonging to another protocol family.
    ForeignType(Option<String>),
    /// `operation` absent or empty.
    MissingOperation,
}

/// Result of classifying an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Accepted(Envelope),
    Discarded(DiscardReason),
}

// Loose shape so that foreign traffic can be classified instead of rejected.
#[derive(Deserialize)]
struct LooseEnvelope {
    #[serde(rename = "type", default)]
    msg_type: Option<String>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decode inbound bytes. Never fails: unusable frames come back as `Discarded`.
pub fn decode_envelope(bytes: &[u8]) -> Decoded {
    let loose: LooseEnvelope = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => return Decoded::Discarded(DiscardReason::InvalidJson(e.to_string())),
    };

    match loose.msg_type.as_deref() {
        Some(PROTOCOL_TAG) => {}
        _ => return Decoded::Discarded(DiscardReason::ForeignType(loose.msg_type)),
    }

    let operation = match loose.operation {
        Some(op) if !op.is_empty() => op,
        _ => return Decoded::Discarded(DiscardReason::MissingOperation),
    };

    Decoded::Accepted(Envelope {
        msg_type: PROTOCOL_TAG.to_string(),
        operation,
        data: loose.data,
    })
}
