//! In-process pub/sub bus.
//!
//! Topics are tokio broadcast channels. Used by the default binary when no
//! broker connector is compiled in, and by tests to inject inbound traffic and
//! observe outbound publishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use aloxi_core::error::{AloxiError, Result};

use crate::config::TransportConfig;
use crate::transport::pubsub::{Connector, InboundMessage, PublishAck, QoS, Session};

const TOPIC_CAPACITY: usize = 256;

#[derive(Default)]
struct BusInner {
    topics: DashMap<String, broadcast::Sender<InboundMessage>>,
    unreachable: AtomicBool,
}

/// Cloneable handle to a shared in-memory broker.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose `connect` always fails.
    pub fn unreachable() -> Self {
        let bus = Self::default();
        bus.set_unreachable(true);
        bus
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::Relaxed);
    }

    fn topic(&self, topic: &str) -> broadcast::Sender<InboundMessage> {
        self.inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Deliver raw bytes to every subscriber of `topic`. Returns receiver count.
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let msg = InboundMessage {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        self.topic(topic).send(msg).unwrap_or(0)
    }

    /// Observe everything published to `topic` from now on.
    pub fn tap(&self, topic: &str) -> broadcast::Receiver<InboundMessage> {
        self.topic(topic).subscribe()
    }
}

#[async_trait]
impl Connector for LocalBus {
    async fn connect(&self, cfg: &TransportConfig) -> Result<Box<dyn Session>> {
        if self.inner.unreachable.load(Ordering::Relaxed) {
            return Err(AloxiError::Transport(format!(
                "broker {}:{} unreachable",
                cfg.endpoint, cfg.port
            )));
        }
        Ok(Box::new(LocalSession {
            bus: self.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct LocalSession {
    bus: LocalBus,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for LocalSession {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<InboundMessage>> {
        let mut sub = self.bus.topic(topic).subscribe();
        let (tx, rx) = mpsc::channel(TOPIC_CAPACITY);
        let closed = Arc::clone(&self.closed);
        tokio::spawn(async move {
            loop {
                match sub.recv().await {
                    Ok(msg) => {
                        if closed.load(Ordering::Relaxed) || tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "local bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }

    async fn publish(&self, topic: &str, payload: Bytes, _qos: QoS) -> Result<PublishAck> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(AloxiError::Transport("session closed".into()));
        }
        let bytes = payload.len();
        let msg = InboundMessage {
            topic: topic.to_string(),
            payload,
        };
        // no subscribers is not an error for a broker
        let _ = self.bus.topic(topic).send(msg);
        Ok(PublishAck {
            topic: topic.to_string(),
            bytes,
            packet_id: None,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
