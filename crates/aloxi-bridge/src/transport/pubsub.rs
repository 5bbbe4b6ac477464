//! Pub/sub client boundary.
//!
//! The broker protocol, TLS, and credentials live behind `Connector`; the
//! bridge only needs connect / subscribe / publish with at-least-once
//! delivery.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use aloxi_core::error::Result;

use crate::config::TransportConfig;

/// Delivery quality for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
}

/// One message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Acknowledgement metadata returned by a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub topic: String,
    pub bytes: usize,
    /// Broker packet id, when the client exposes one.
    pub packet_id: Option<u16>,
}

/// Opens sessions against a broker.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, cfg: &TransportConfig) -> Result<Box<dyn Session>>;
}

/// A live broker session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Subscribe; the receiver yields messages until the session ends.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<InboundMessage>>;

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<PublishAck>;

    /// Best-effort close.
    async fn close(&self) {}
}
