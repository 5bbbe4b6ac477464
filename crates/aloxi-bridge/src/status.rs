//! Status Consolidator.
//!
//! A passive observer: it merges `StateEvent`s from the transport and the
//! controller into one `BridgeStatus` and republishes it on a watch channel.
//! Nothing upstream waits on it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use aloxi_core::error::Result;

use crate::events::{ConnectivityState, EventBus, ModelEvent, StateEvent};
use crate::runtime::{spawn_supervised, Mailbox, SupervisionPolicy, Worker, WorkerHandle};

pub const COMPONENT: &str = "status";

/// Whether a component came up at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Availability {
    Ready,
    Unavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub devices: usize,
    pub revision: u64,
    /// Unix millis of the last successful reconciliation.
    pub last_refresh: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub transport: ConnectivityState,
    pub model: ModelStatus,
    pub components: BTreeMap<String, Availability>,
    /// Unix millis of the last merged event.
    pub updated_at: u64,
}

impl Default for BridgeStatus {
    fn default() -> Self {
        Self {
            transport: ConnectivityState::Disconnected,
            model: ModelStatus::default(),
            components: BTreeMap::new(),
            updated_at: unix_millis(SystemTime::now()),
        }
    }
}

impl BridgeStatus {
    /// Transport connected and at least one model loaded.
    pub fn is_ready(&self) -> bool {
        self.transport == ConnectivityState::Connected && self.model.last_refresh.is_some()
    }

    fn apply(&mut self, event: StateEvent) {
        match event {
            StateEvent::Transport(state) => self.transport = state,
            StateEvent::Model(ModelEvent::Refreshed {
                devices,
                revision,
                at,
                ..
            }) => {
                self.model.devices = devices;
                self.model.revision = revision;
                self.model.last_refresh = Some(unix_millis(at));
                self.model.last_error = None;
            }
            StateEvent::Model(ModelEvent::RefreshFailed { reason, .. }) => {
                self.model.last_error = Some(reason);
            }
        }
        self.updated_at = unix_millis(SystemTime::now());
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub enum StatusMsg {
    Event(StateEvent),
    Component {
        name: String,
        availability: Availability,
    },
}

/// Cloneable handle to the consolidator.
#[derive(Clone)]
pub struct StatusConsolidator {
    mailbox: Mailbox<StatusMsg>,
    status: watch::Receiver<BridgeStatus>,
}

impl StatusConsolidator {
    /// Spawn the worker plus the task pumping `events` into it.
    pub fn spawn(
        events: &EventBus,
        capacity: usize,
        policy: SupervisionPolicy,
    ) -> (Self, WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = watch::channel(BridgeStatus::default());
        let tx = Arc::new(tx);
        let (mailbox, handle) = spawn_supervised(COMPONENT, capacity, policy, move || {
            StatusWorker {
                tx: Arc::clone(&tx),
            }
        });
        let pump = tokio::spawn(pump(events.subscribe(), mailbox.clone()));
        (
            Self {
                mailbox,
                status: rx,
            },
            handle,
            pump,
        )
    }

    /// Latest merged snapshot.
    pub fn status(&self) -> BridgeStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeStatus> {
        self.status.clone()
    }

    /// Merge an event directly, for state that predates the subscription.
    pub async fn observe(&self, event: StateEvent) -> Result<()> {
        self.mailbox.send(StatusMsg::Event(event)).await
    }

    pub async fn set_component(&self, name: impl Into<String>, availability: Availability) -> Result<()> {
        self.mailbox
            .send(StatusMsg::Component {
                name: name.into(),
                availability,
            })
            .await
    }
}

async fn pump(mut rx: broadcast::Receiver<StateEvent>, mailbox: Mailbox<StatusMsg>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if mailbox.send(StatusMsg::Event(event)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(component = COMPONENT, missed, "status lagged behind state events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

struct StatusWorker {
    // survives restarts so subscribers keep their receiver
    tx: Arc<watch::Sender<BridgeStatus>>,
}

#[async_trait]
impl Worker for StatusWorker {
    type Message = StatusMsg;

    async fn handle(&mut self, msg: StatusMsg) -> Result<()> {
        match msg {
            StatusMsg::Event(event) => {
                tracing::trace!(?event, "state event");
                self.tx.send_modify(|s| s.apply(event));
            }
            StatusMsg::Component { name, availability } => {
                self.tx.send_modify(|s| {
                    s.components.insert(name, availability);
                    s.updated_at = unix_millis(SystemTime::now());
                });
            }
        }
        Ok(())
    }
}
