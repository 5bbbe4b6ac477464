//! Aloxi core: transport-agnostic protocol primitives, device model, and error types.
//!
//! This crate defines the wire-level contracts shared by the bridge and by
//! anything talking to it over the pub/sub channel. It carries no transport or
//! runtime dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed traffic
//! and malformed controller documents surface as values (`Decoded::Discarded`,
//! skipped entries) or as `AloxiError`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod model;
pub mod protocol;
pub mod skill;

/// Shared result type.
pub use error::{AloxiError, Result};
