//! Aloxi: voice-assistant skill to home-controller bridge.
//!
//! Single-dependency entry point. `core` holds the wire envelope, device model
//! and skill forms; `bridge` holds the supervised components. Most embedders
//! only need the `prelude`:
//!
//! ```no_run
//! use std::sync::Arc;
//! use aloxi::prelude::*;
//!
//! # async fn run() -> aloxi::core::Result<()> {
//! let cfg = load_config("aloxi.yaml")?;
//! let bridge = Bridge::start(cfg, Arc::new(LocalBus::new())).await;
//! println!("{:?}", bridge.status().transport);
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod core {
    pub use aloxi_core::*;
}

pub mod bridge {
    pub use aloxi_bridge::*;
}

pub mod prelude {
    pub use aloxi_bridge::config::{load_from_file as load_config, BridgeConfig};
    pub use aloxi_bridge::status::BridgeStatus;
    pub use aloxi_bridge::transport::{Connector, LocalBus};
    pub use aloxi_bridge::{Bridge, Component};
    pub use aloxi_core::protocol::Envelope;
    pub use aloxi_core::skill::{SkillRequest, SkillResponse};
    pub use aloxi_core::{AloxiError, Result};
}
