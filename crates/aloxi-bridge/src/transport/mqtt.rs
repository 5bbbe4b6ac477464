//! MQTT connector (feature `mqtt`), e.g. for AWS IoT Core.
//!
//! Subscriptions match topics exactly; wildcard filters are not routed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, TlsConfiguration, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use aloxi_core::error::{AloxiError, Result};

use crate::config::TransportConfig;
use crate::transport::pubsub::{Connector, InboundMessage, PublishAck, QoS, Session};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CLIENT_CAPACITY: usize = 64;
const ROUTE_CAPACITY: usize = 256;

type Routes = Arc<DashMap<String, mpsc::Sender<InboundMessage>>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct MqttConnector;

async fn read_file(path: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| AloxiError::Config(format!("read {path} failed: {e}")))
}

fn map_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self, cfg: &TransportConfig) -> Result<Box<dyn Session>> {
        let mut opts = MqttOptions::new(cfg.client_id.clone(), cfg.endpoint.clone(), cfg.port);
        opts.set_keep_alive(KEEP_ALIVE);

        if let Some(ca_path) = &cfg.ca_path {
            let ca = read_file(ca_path).await?;
            let client_auth = match (&cfg.cert_path, &cfg.key_path) {
                (Some(cert), Some(key)) => Some((read_file(cert).await?, read_file(key).await?)),
                _ => None,
            };
            opts.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth,
            }));
        }

        let (client, mut eventloop) = AsyncClient::new(opts, CLIENT_CAPACITY);

        let connack = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(AloxiError::Transport(format!("mqtt connect failed: {e}"))),
                }
            }
        };
        tokio::time::timeout(Duration::from_millis(cfg.connect_timeout_ms), connack)
            .await
            .map_err(|_| AloxiError::Transport("mqtt connect timed out".into()))??;

        let routes: Routes = Arc::new(DashMap::new());
        let pump_routes = Arc::clone(&routes);
        let pump = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let Some(tx) = pump_routes.get(&p.topic).map(|r| r.value().clone()) else {
                            continue;
                        };
                        let msg = InboundMessage {
                            topic: p.topic.clone(),
                            payload: p.payload.clone(),
                        };
                        if tx.try_send(msg).is_err() {
                            tracing::warn!(topic = %p.topic, "inbound queue full, dropping message");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "mqtt event loop ended");
                        break;
                    }
                }
            }
            // closing the routes ends every subscription stream
            pump_routes.clear();
        });

        Ok(Box::new(MqttSession {
            client,
            routes,
            pump,
        }))
    }
}

struct MqttSession {
    client: AsyncClient,
    routes: Routes,
    pump: JoinHandle<()>,
}

#[async_trait]
impl Session for MqttSession {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<InboundMessage>> {
        let (tx, rx) = mpsc::channel(ROUTE_CAPACITY);
        self.routes.insert(topic.to_string(), tx);
        self.client
            .subscribe(topic, rumqttc::QoS::AtLeastOnce)
            .await
            .map_err(|e| AloxiError::Transport(format!("subscribe {topic} failed: {e}")))?;
        Ok(rx)
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<PublishAck> {
        let bytes = payload.len();
        self.client
            .publish(topic, map_qos(qos), false, payload.to_vec())
            .await
            .map_err(|e| AloxiError::Transport(format!("publish {topic} failed: {e}")))?;
        Ok(PublishAck {
            topic: topic.to_string(),
            bytes,
            packet_id: None,
        })
    }

    async fn close(&self) {
        let _ = self.client.disconnect().await;
        self.pump.abort();
        self.routes.clear();
    }
}
