//! Operation registry exports.
//!
//! Re-exports the registry and the handler trait so downstream consumers can
//! depend on this module directly.

pub mod registry;

pub use registry::{DispatchOutcome, OperationHandler, OperationRegistry};
