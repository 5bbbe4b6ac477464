//! Aloxi bridge library entry.
//!
//! Connects a voice-assistant skill, a pub/sub transport and a home
//! controller's HTTP API. Each component runs as a supervised worker with its
//! own mailbox; `bridge::Bridge` builds and wires them. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod events;
pub mod ops;
pub mod runtime;
pub mod services;
pub mod status;
pub mod transport;

pub use bridge::{Bridge, Component};
