//! Pub/sub transport.
//!
//! `TransportManager` owns the single broker session and the operation
//! registry; connectors implement the broker boundary.

pub mod codec;
pub mod local;
pub mod manager;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod pubsub;

pub use local::LocalBus;
pub use manager::TransportManager;
#[cfg(feature = "mqtt")]
pub use mqtt::MqttConnector;
pub use pubsub::{Connector, InboundMessage, PublishAck, QoS, Session};
