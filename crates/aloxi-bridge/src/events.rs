//! State-change notifications fanned out to passive observers.
//!
//! Sources hold an `EventBus` and fire-and-forget; a send with no live
//! receiver is not an error, so an observer going away never affects the
//! source.

use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 128;

/// Pub/sub session state as seen by the transport manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Controller reconciliation results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    Refreshed {
        devices: usize,
        skipped: usize,
        revision: u64,
        at: SystemTime,
    },
    RefreshFailed {
        reason: String,
        at: SystemTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    Transport(ConnectivityState),
    Model(ModelEvent),
}

/// Cloneable sender side of the state-event fan-out.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StateEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(EVENT_CAPACITY).0,
        }
    }

    pub fn emit(&self, event: StateEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.tx.subscribe()
    }
}
