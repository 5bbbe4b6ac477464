use std::time::Duration;

use serde::Deserialize;
use url::Url;

use aloxi_core::error::{AloxiError, Result};
use aloxi_core::model::IgnoreRules;

use crate::runtime::{RestartStrategy, SupervisionPolicy};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub version: u32,

    pub transport: TransportConfig,

    pub controller: ControllerConfig,

    #[serde(default)]
    pub echo: EchoConfig,

    #[serde(default)]
    pub supervision: SupervisionConfig,

    #[serde(default)]
    pub ops: OpsConfig,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(AloxiError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.transport.validate()?;
        self.controller.validate()?;
        self.echo.validate()?;
        self.supervision.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    pub endpoint: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub client_id: String,

    #[serde(default)]
    pub ca_path: Option<String>,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    pub topics: TopicsConfig,
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(AloxiError::Config("transport.endpoint must not be empty".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(AloxiError::Config("transport.client_id must not be empty".into()));
        }
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(AloxiError::Config(
                "transport.cert_path and transport.key_path must be set together".into(),
            ));
        }
        if !(100..=120000).contains(&self.connect_timeout_ms) {
            return Err(AloxiError::Config(
                "transport.connect_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        self.topics.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicsConfig {
    /// Topic the bridge subscribes to.
    pub inbound: String,
    /// Topic the bridge publishes to.
    pub outbound: String,
}

impl TopicsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inbound.is_empty() || self.outbound.is_empty() {
            return Err(AloxiError::Config("transport.topics must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub base_url: String,

    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_model_document")]
    pub model_document: String,

    /// 0 disables periodic reconciliation.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub ignore: IgnoreConfig,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url)
            .map_err(|e| AloxiError::Config(format!("controller.base_url invalid: {e}")))?;
        if self.model_document.is_empty() {
            return Err(AloxiError::Config("controller.model_document must not be empty".into()));
        }
        if !(100..=60000).contains(&self.request_timeout_ms) {
            return Err(AloxiError::Config(
                "controller.request_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_ms > 0).then(|| Duration::from_millis(self.refresh_interval_ms))
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules::new(
            self.ignore.categories.iter().cloned(),
            self.ignore.controls.iter().cloned(),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub controls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EchoConfig {
    #[serde(default = "default_echo_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_echo_deadline_ms(),
        }
    }
}

impl EchoConfig {
    pub fn validate(&self) -> Result<()> {
        if !(100..=60000).contains(&self.deadline_ms) {
            return Err(AloxiError::Config(
                "echo.deadline_ms must be between 100 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisionConfig {
    #[serde(default)]
    pub restart: RestartMode,
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

/// `supervision.restart`. `fixed` waits `backoff_initial_ms` every time;
/// `backoff` doubles it up to `backoff_max_ms`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    Never,
    Immediate,
    Fixed,
    #[default]
    Backoff,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            restart: RestartMode::default(),
            mailbox_capacity: default_mailbox_capacity(),
            max_restarts: default_max_restarts(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl SupervisionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(AloxiError::Config("supervision.mailbox_capacity must be >= 1".into()));
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(AloxiError::Config(
                "supervision.backoff_max_ms must not be less than backoff_initial_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> SupervisionPolicy {
        let initial = Duration::from_millis(self.backoff_initial_ms);
        let strategy = match self.restart {
            RestartMode::Never => RestartStrategy::Never,
            RestartMode::Immediate => RestartStrategy::Immediate,
            RestartMode::Fixed => RestartStrategy::FixedDelay(initial),
            RestartMode::Backoff if initial.is_zero() => RestartStrategy::Immediate,
            RestartMode::Backoff => RestartStrategy::ExponentialBackoff {
                initial,
                max: Duration::from_millis(self.backoff_max_ms),
            },
        };
        SupervisionPolicy {
            strategy,
            max_restarts: self.max_restarts,
        }
    }
}

/// Operational HTTP surface (`/healthz`, `/status`). Disabled when `listen` is unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsConfig {
    #[serde(default)]
    pub listen: Option<String>,
}

fn default_port() -> u16 {
    8883
}
fn default_connect_timeout_ms() -> u64 {
    10000
}
fn default_model_document() -> String {
    "LoxAPP3.json".into()
}
fn default_refresh_interval_ms() -> u64 {
    300000
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_echo_deadline_ms() -> u64 {
    5000
}
fn default_mailbox_capacity() -> usize {
    256
}
fn default_max_restarts() -> usize {
    5
}
fn default_backoff_initial_ms() -> u64 {
    100
}
fn default_backoff_max_ms() -> u64 {
    5000
}
