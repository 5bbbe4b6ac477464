//! Protocol modules for the pub/sub channel.
//!
//! Every message on the channel is a JSON envelope tagged with the protocol
//! family (`type`) and an `operation` key that selects the handler. Decoding is
//! a filter, not a parser that fails: traffic from other protocol families and
//! malformed frames are classified as `Decoded::Discarded` so the transport's
//! read loop never sees an error.

pub mod envelope;

pub use envelope::{decode_envelope, Decoded, DiscardReason, Envelope, PROTOCOL_TAG};

/// Operation keys understood by the bridge.
pub mod ops {
    /// Connectivity check carrying a correlation token.
    pub const ECHO_REQUEST: &str = "echoRequest";
    /// Answer to `echoRequest`; data is the token verbatim.
    pub const ECHO_RESPONSE: &str = "echoResponse";
    /// Device-control request originating from the skill.
    pub const SKILL_REQUEST: &str = "skillRequest";
    /// Reply to `skillRequest`.
    pub const SKILL_RESPONSE: &str = "skillResponse";
}
