//! Transport Manager.
//!
//! Owns the broker session (exclusively, inside its worker) and the operation
//! registry. Inbound messages are read by a dedicated task that decodes,
//! filters, and dispatches; a missing handler or a failing handler is logged
//! and never ends the read loop, because ending it would drop delivery for
//! every operation. When the broker ends the inbound stream, the reader tells
//! the worker to drop the session, so publishes fail until the next connect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use aloxi_core::error::{AloxiError, Result};
use aloxi_core::protocol::Envelope;

use crate::config::TransportConfig;
use crate::dispatch::{OperationHandler, OperationRegistry};
use crate::events::{ConnectivityState, EventBus, StateEvent};
use crate::runtime::{
    spawn_supervised, Mailbox, SupervisionPolicy, WeakMailbox, Worker, WorkerHandle,
};
use crate::transport::codec;
use crate::transport::pubsub::{Connector, InboundMessage, PublishAck, QoS, Session};

pub const COMPONENT: &str = "transport";

pub enum TransportMsg {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Publish {
        env: Envelope,
        reply: oneshot::Sender<Result<PublishAck>>,
    },
    /// Sent by the reader of session `generation` when its stream ends.
    StreamEnded {
        generation: u64,
    },
}

/// State shared by the handle, the worker (across restarts) and the reader.
struct Shared {
    cfg: TransportConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<OperationRegistry>,
    state: watch::Sender<ConnectivityState>,
    events: EventBus,
    // set after the first successful connect; a restarted worker reconnects
    was_connected: AtomicBool,
    // bumped per opened session; a stale reader must not touch a newer one
    generation: AtomicU64,
    mailbox: OnceLock<WeakMailbox<TransportMsg>>,
}

impl Shared {
    fn set_state(&self, state: ConnectivityState) {
        self.state.send_replace(state.clone());
        self.events.emit(StateEvent::Transport(state));
    }
}

/// Cloneable handle to the transport worker.
#[derive(Clone)]
pub struct TransportManager {
    mailbox: Mailbox<TransportMsg>,
    shared: Arc<Shared>,
    state: watch::Receiver<ConnectivityState>,
}

impl TransportManager {
    /// Spawn the worker. The session is not opened until `connect`.
    pub fn spawn(
        cfg: TransportConfig,
        connector: Arc<dyn Connector>,
        events: EventBus,
        capacity: usize,
        policy: SupervisionPolicy,
    ) -> (Self, WorkerHandle) {
        let (state_tx, state_rx) = watch::channel(ConnectivityState::Disconnected);
        let shared = Arc::new(Shared {
            cfg,
            connector,
            registry: Arc::new(OperationRegistry::new()),
            state: state_tx,
            events,
            was_connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            mailbox: OnceLock::new(),
        });

        let factory_shared = Arc::clone(&shared);
        let (mailbox, handle) = spawn_supervised(COMPONENT, capacity, policy, move || {
            TransportWorker {
                shared: Arc::clone(&factory_shared),
                session: None,
                reader: None,
            }
        });
        let _ = shared.mailbox.set(mailbox.downgrade());

        (
            Self {
                mailbox,
                shared,
                state: state_rx,
            },
            handle,
        )
    }

    /// Open the session and start reading. No automatic retry on failure.
    pub async fn connect(&self) -> Result<()> {
        self.mailbox
            .ask(|reply| TransportMsg::Connect { reply })
            .await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.mailbox
            .ask(|reply| TransportMsg::Disconnect { reply })
            .await
    }

    /// Upsert; last registration for an operation wins.
    pub fn register_handler(&self, operation: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        let operation = operation.into();
        if self.shared.registry.register(operation.clone(), handler) {
            tracing::info!(%operation, "handler replaced");
        } else {
            tracing::debug!(%operation, "handler registered");
        }
    }

    pub fn unregister_handler(&self, operation: &str) -> bool {
        self.shared.registry.unregister(operation)
    }

    pub fn registered_operations(&self) -> Vec<String> {
        self.shared.registry.registered_operations()
    }

    /// Publish to the outbound topic with at-least-once delivery.
    pub async fn publish(&self, env: Envelope) -> Result<PublishAck> {
        self.mailbox
            .ask(|reply| TransportMsg::Publish { env, reply })
            .await?
    }

    pub fn state(&self) -> ConnectivityState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.borrow(), ConnectivityState::Connected)
    }

    /// Watch connectivity changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectivityState> {
        self.state.clone()
    }
}

struct TransportWorker {
    shared: Arc<Shared>,
    session: Option<Box<dyn Session>>,
    reader: Option<JoinHandle<()>>,
}

impl TransportWorker {
    async fn open(&mut self) -> Result<()> {
        self.close().await;
        self.shared.set_state(ConnectivityState::Connecting);

        let shared = Arc::clone(&self.shared);
        let opened = async {
            let session = shared.connector.connect(&shared.cfg).await?;
            let inbound = session.subscribe(&shared.cfg.topics.inbound).await?;
            Ok::<_, AloxiError>((session, inbound))
        }
        .await;

        match opened {
            Ok((session, inbound)) => {
                let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
                self.reader = Some(tokio::spawn(read_loop(
                    inbound,
                    Arc::clone(&self.shared),
                    generation,
                )));
                self.session = Some(session);
                self.shared.was_connected.store(true, Ordering::Relaxed);
                self.shared.set_state(ConnectivityState::Connected);
                tracing::info!(
                    endpoint = %self.shared.cfg.endpoint,
                    topic = %self.shared.cfg.topics.inbound,
                    "transport connected"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(endpoint = %self.shared.cfg.endpoint, error = %e, "transport connect failed");
                self.shared.set_state(ConnectivityState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    async fn publish(&mut self, env: &Envelope) -> Result<PublishAck> {
        // stream-end notice lost to a full mailbox
        if self.reader.as_ref().is_some_and(JoinHandle::is_finished) {
            self.close().await;
        }
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| AloxiError::Unavailable("transport not connected".into()))?;
        let payload = codec::encode(env)?;
        session
            .publish(&self.shared.cfg.topics.outbound, payload, QoS::AtLeastOnce)
            .await
    }
}

#[async_trait]
impl Worker for TransportWorker {
    type Message = TransportMsg;

    async fn started(&mut self) {
        if self.shared.was_connected.load(Ordering::Relaxed) {
            tracing::info!("restoring transport session after restart");
            if let Err(e) = self.open().await {
                tracing::error!(error = %e, "transport session not restored after restart");
            }
        }
    }

    async fn handle(&mut self, msg: TransportMsg) -> Result<()> {
        match msg {
            TransportMsg::Connect { reply } => {
                let _ = reply.send(self.open().await);
            }
            TransportMsg::Disconnect { reply } => {
                self.close().await;
                self.shared.was_connected.store(false, Ordering::Relaxed);
                self.shared.set_state(ConnectivityState::Disconnected);
                let _ = reply.send(());
            }
            TransportMsg::Publish { env, reply } => {
                let result = self.publish(&env).await;
                if let Err(e) = &result {
                    tracing::warn!(operation = %env.operation, error = %e, "publish failed");
                }
                let _ = reply.send(result);
            }
            TransportMsg::StreamEnded { generation } => {
                let current = self.shared.generation.load(Ordering::Acquire);
                if generation == current && self.session.is_some() {
                    tracing::info!(generation, "dropping transport session after stream end");
                    self.close().await;
                }
            }
        }
        Ok(())
    }

    async fn stopped(&mut self) {
        self.close().await;
    }
}

impl Drop for TransportWorker {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_loop(
    mut inbound: mpsc::Receiver<InboundMessage>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(msg) = inbound.recv().await {
        if let Some(env) = codec::decode(&msg) {
            shared.registry.dispatch(env).await;
        }
    }
    if shared.generation.load(Ordering::Acquire) != generation {
        return;
    }
    tracing::warn!(generation, "transport inbound stream ended");
    shared.set_state(ConnectivityState::Disconnected);
    let notified = shared
        .mailbox
        .get()
        .and_then(WeakMailbox::upgrade)
        .map(|mailbox| mailbox.try_send(TransportMsg::StreamEnded { generation }));
    if let Some(Err(e)) = notified {
        tracing::warn!(error = %e, "stream end not delivered to the transport worker");
    }
}
