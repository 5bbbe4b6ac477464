//! Shared fixtures for bridge integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

use aloxi_bridge::config::{self, BridgeConfig};
use aloxi_bridge::dispatch::OperationHandler;
use aloxi_bridge::transport::InboundMessage;
use aloxi_core::error::{AloxiError, Result};
use aloxi_core::protocol::{decode_envelope, Decoded, Envelope};

pub const INBOUND: &str = "aloxi/bridge";
pub const OUTBOUND: &str = "aloxi/skill";

pub fn config_yaml(controller_base: &str) -> String {
    format!(
        r#"
version: 1
transport:
  endpoint: "broker.test"
  client_id: "aloxi-test"
  topics:
    inbound: "{INBOUND}"
    outbound: "{OUTBOUND}"
controller:
  base_url: "{controller_base}"
  refresh_interval_ms: 0
  request_timeout_ms: 2000
echo:
  deadline_ms: 500
supervision:
  mailbox_capacity: 32
  max_restarts: 2
  backoff_initial_ms: 0
  backoff_max_ms: 0
"#
    )
}

pub fn config(controller_base: &str) -> BridgeConfig {
    config::load_from_str(&config_yaml(controller_base)).expect("test config must parse")
}

/// Three switches plus one control without `uuidAction`.
pub fn home_document() -> Value {
    json!({
        "rooms": {
            "r-kitchen": { "name": "Kitchen" },
            "r-hall": { "name": "Hall" }
        },
        "cats": { "c-light": { "name": "Lighting" } },
        "controls": {
            "a-ceiling": { "name": "Ceiling", "type": "Switch", "uuidAction": "a-ceiling",
                           "room": "r-kitchen", "cat": "c-light" },
            "b-counter": { "name": "Counter", "type": "Switch", "uuidAction": "b-counter",
                           "room": "r-kitchen", "cat": "c-light" },
            "c-broken":  { "name": "Broken", "type": "Switch", "room": "r-hall" },
            "d-hall":    { "name": "Hall Lamp", "type": "Switch", "uuidAction": "d-hall",
                           "room": "r-hall", "cat": "c-light" }
        }
    })
}

pub fn frame(operation: &str, data: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({ "type": "aloxiComm", "operation": operation, "data": data }))
        .expect("frame serializes")
}

/// Next published envelope on a tapped topic.
pub async fn next_envelope(rx: &mut broadcast::Receiver<InboundMessage>) -> Envelope {
    let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no publish within 2s")
        .expect("tap closed");
    match decode_envelope(&msg.payload) {
        Decoded::Accepted(env) => env,
        Decoded::Discarded(reason) => panic!("bridge published a non-envelope: {reason:?}"),
    }
}

/// Records every envelope it is handed; optionally fails each one.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Envelope>,
    fail: bool,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, fail: false }), rx)
    }

    pub fn failing() -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, fail: true }), rx)
    }
}

#[async_trait]
impl OperationHandler for Recorder {
    async fn handle(&self, env: Envelope) -> Result<()> {
        let _ = self.tx.send(env);
        if self.fail {
            return Err(AloxiError::Internal("recorder told to fail".into()));
        }
        Ok(())
    }
}

pub async fn recv(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("nothing dispatched within 2s")
        .expect("recorder dropped")
}
