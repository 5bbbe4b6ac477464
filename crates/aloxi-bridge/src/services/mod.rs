//! Bus-facing services registered with the transport manager.

pub mod echo;
pub mod skill;

pub use echo::{EchoMsg, EchoOutcome, EchoProcessor};
pub use skill::{SkillAdapter, SkillMsg};
