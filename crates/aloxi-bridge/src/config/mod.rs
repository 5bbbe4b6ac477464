//! Bridge config loader (strict parsing).

pub mod schema;

use std::fs;

use aloxi_core::error::{AloxiError, Result};

pub use schema::{
    BridgeConfig, ControllerConfig, EchoConfig, IgnoreConfig, OpsConfig, RestartMode,
    SupervisionConfig, TopicsConfig, TransportConfig,
};

pub fn load_from_file(path: &str) -> Result<BridgeConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| AloxiError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BridgeConfig> {
    let cfg: BridgeConfig = serde_yaml::from_str(s)
        .map_err(|e| AloxiError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
