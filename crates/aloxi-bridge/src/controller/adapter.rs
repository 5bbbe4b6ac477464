//! Controller Adapter worker.
//!
//! The current `Home` lives in an `ArcSwap`: the worker is the only writer
//! and swaps in a complete new snapshot per reconciliation, readers load an
//! `Arc<Home>` without locking. A failed reconciliation leaves the previous
//! snapshot in place.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use aloxi_core::error::Result;
use aloxi_core::model::{parse_document, Home, IgnoreRules};

use crate::controller::client::{ControllerClient, ControllerCommand};
use crate::events::{EventBus, ModelEvent, StateEvent};
use crate::runtime::{spawn_interval, spawn_supervised, Mailbox, SupervisionPolicy, Worker, WorkerHandle};

pub const COMPONENT: &str = "controller";

pub enum ControllerMsg {
    LoadModel {
        reply: Option<oneshot::Sender<Result<Arc<Home>>>>,
    },
    Execute {
        device_id: String,
        command: ControllerCommand,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cloneable handle to the controller worker.
#[derive(Clone)]
pub struct ControllerAdapter {
    mailbox: Mailbox<ControllerMsg>,
    snapshot: Arc<ArcSwap<Home>>,
}

impl ControllerAdapter {
    pub fn spawn(
        client: ControllerClient,
        rules: IgnoreRules,
        events: EventBus,
        capacity: usize,
        policy: SupervisionPolicy,
    ) -> (Self, WorkerHandle) {
        let snapshot = Arc::new(ArcSwap::from_pointee(Home::default()));
        let client = Arc::new(client);
        let rules = Arc::new(rules);

        let worker_snapshot = Arc::clone(&snapshot);
        let (mailbox, handle) = spawn_supervised(COMPONENT, capacity, policy, move || {
            ControllerWorker {
                client: Arc::clone(&client),
                rules: Arc::clone(&rules),
                snapshot: Arc::clone(&worker_snapshot),
                events: events.clone(),
            }
        });

        (Self { mailbox, snapshot }, handle)
    }

    /// Reconcile now and return the new snapshot.
    pub async fn load_model(&self) -> Result<Arc<Home>> {
        self.mailbox
            .ask(|reply| ControllerMsg::LoadModel { reply: Some(reply) })
            .await?
    }

    /// Queue a reconciliation without waiting for it.
    pub fn request_reload(&self) -> Result<()> {
        self.mailbox.try_send(ControllerMsg::LoadModel { reply: None })
    }

    /// Re-run reconciliation every `period`.
    pub fn spawn_refresh(&self, period: Duration) -> JoinHandle<()> {
        spawn_interval(self.mailbox.clone(), period, || ControllerMsg::LoadModel {
            reply: None,
        })
    }

    /// Current snapshot.
    pub fn model(&self) -> Arc<Home> {
        self.snapshot.load_full()
    }

    pub async fn execute(&self, device_id: impl Into<String>, command: ControllerCommand) -> Result<()> {
        let device_id = device_id.into();
        self.mailbox
            .ask(|reply| ControllerMsg::Execute {
                device_id,
                command,
                reply,
            })
            .await?
    }
}

struct ControllerWorker {
    client: Arc<ControllerClient>,
    rules: Arc<IgnoreRules>,
    snapshot: Arc<ArcSwap<Home>>,
    events: EventBus,
}

impl ControllerWorker {
    async fn reconcile(&self) -> Result<Arc<Home>> {
        let derived = match self.client.fetch_model().await {
            Ok(doc) => parse_document(&doc, &self.rules),
            Err(e) => Err(e),
        };

        let report = match derived {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "model reconciliation failed, keeping previous snapshot");
                self.events.emit(StateEvent::Model(ModelEvent::RefreshFailed {
                    reason: e.to_string(),
                    at: SystemTime::now(),
                }));
                return Err(e);
            }
        };

        let revision = self.snapshot.load().revision() + 1;
        let skipped = report.skipped.len();
        let home = Arc::new(report.home.with_revision(revision));
        self.snapshot.store(Arc::clone(&home));

        tracing::info!(devices = home.len(), skipped, revision, "device model reconciled");
        self.events.emit(StateEvent::Model(ModelEvent::Refreshed {
            devices: home.len(),
            skipped,
            revision,
            at: SystemTime::now(),
        }));
        Ok(home)
    }
}

#[async_trait]
impl Worker for ControllerWorker {
    type Message = ControllerMsg;

    async fn handle(&mut self, msg: ControllerMsg) -> Result<()> {
        match msg {
            ControllerMsg::LoadModel { reply } => {
                let result = self.reconcile().await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            ControllerMsg::Execute {
                device_id,
                command,
                reply,
            } => {
                let result = self.client.send_command(&device_id, command).await;
                match &result {
                    Ok(()) => tracing::info!(%device_id, %command, "controller command sent"),
                    Err(e) => tracing::warn!(%device_id, %command, error = %e, "controller command failed"),
                }
                let _ = reply.send(result);
            }
        }
        Ok(())
    }
}
