//! Controller Adapter: device-model reconciliation and command execution
//! against the home-automation controller's HTTP surface.

pub mod adapter;
pub mod client;

pub use adapter::{ControllerAdapter, ControllerMsg};
pub use client::{ControllerClient, ControllerCommand};
