//! Decode-once codec for inbound transport messages.
//!
//! Filter discards are expected traffic (other protocol families share the
//! topic), so they are logged at debug level and never surfaced as errors.

use bytes::Bytes;

use aloxi_core::error::Result;
use aloxi_core::protocol::{decode_envelope, Decoded, Envelope};

use crate::transport::pubsub::InboundMessage;

/// Envelope to dispatch, or `None` when the message is filtered out.
pub fn decode(msg: &InboundMessage) -> Option<Envelope> {
    match decode_envelope(&msg.payload) {
        Decoded::Accepted(env) => Some(env),
        Decoded::Discarded(reason) => {
            tracing::debug!(topic = %msg.topic, bytes = msg.payload.len(), ?reason, "inbound message discarded");
            None
        }
    }
}

pub fn encode(env: &Envelope) -> Result<Bytes> {
    env.to_bytes()
}
