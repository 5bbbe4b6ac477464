// Controller HTTP client
//
// Wraps `reqwest::Client` with the controller's URL layout: the model
// document lives under `/data/<document>`, device commands under
// `/dev/sps/io/<id>/<command>`. Any status other than 200 is a failure.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

use aloxi_core::error::{AloxiError, Result};

use crate::config::ControllerConfig;

/// Command sent to a single switch control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    On,
    Off,
}

impl fmt::Display for ControllerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerCommand::On => f.write_str("On"),
            ControllerCommand::Off => f.write_str("Off"),
        }
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// Raw HTTP client for the controller.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: Url,
    model_document: String,
    credentials: Option<Credentials>,
}

impl ControllerClient {
    /// Build from config (parses the base URL, applies the request timeout).
    pub fn new(cfg: &ControllerConfig) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| AloxiError::Config(format!("controller.base_url invalid: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| AloxiError::Controller(format!("http client build failed: {e}")))?;

        let mut client = Self::with_client(http, base_url, cfg.model_document.clone());
        if let Some(username) = &cfg.username {
            client.credentials = Some(Credentials {
                username: username.clone(),
                password: cfg.password.clone(),
            });
        }
        Ok(client)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, model_document: String) -> Self {
        Self {
            http,
            base_url,
            model_document,
            credentials: None,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        let full = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&full).map_err(|e| AloxiError::Controller(format!("invalid url {full}: {e}")))
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        let mut req = self.http.get(url);
        if let Some(c) = &self.credentials {
            req = req.basic_auth(&c.username, c.password.as_ref());
        }
        let resp = req
            .send()
            .await
            .map_err(|e| AloxiError::Controller(format!("request failed: {e}")))?;
        if resp.status() != StatusCode::OK {
            return Err(AloxiError::Fetch {
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }

    /// `GET <base>/data/<model-document>`.
    pub async fn fetch_model(&self) -> Result<Value> {
        let url = self.url(&format!("data/{}", self.model_document))?;
        self.get(url)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| AloxiError::Controller(format!("model document unreadable: {e}")))
    }

    /// `GET <base>/dev/sps/io/<id>/<command>`.
    pub async fn send_command(&self, id: &str, command: ControllerCommand) -> Result<()> {
        let url = self.url(&format!("dev/sps/io/{id}/{command}"))?;
        self.get(url).await.map(|_| ())
    }
}
