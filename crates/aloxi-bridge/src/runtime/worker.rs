use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use aloxi_core::error::{AloxiError, Result};

use crate::runtime::SupervisionPolicy;

/// A component processing one message at a time from its own mailbox.
#[async_trait]
pub trait Worker: Send + 'static {
    type Message: Send + 'static;

    /// Called before the first message (and again after every restart).
    async fn started(&mut self) {}

    /// Handle one message. An `Err` is logged and processing continues.
    async fn handle(&mut self, msg: Self::Message) -> Result<()>;

    /// Called once the mailbox is closed and drained.
    async fn stopped(&mut self) {}
}

/// Sending side of a worker's mailbox.
pub struct Mailbox<M> {
    name: &'static str,
    tx: mpsc::Sender<M>,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<M: Send + 'static> Mailbox<M> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueue, waiting for capacity.
    pub async fn send(&self, msg: M) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| AloxiError::Unavailable(format!("{} stopped", self.name)))
    }

    /// Enqueue without waiting; a full queue is an error.
    pub fn try_send(&self, msg: M) -> Result<()> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                AloxiError::Unavailable(format!("{} mailbox full", self.name))
            }
            mpsc::error::TrySendError::Closed(_) => {
                AloxiError::Unavailable(format!("{} stopped", self.name))
            }
        })
    }

    /// Request/response over the mailbox.
    pub async fn ask<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> M) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| AloxiError::Unavailable(format!("{} dropped the request", self.name)))
    }
}

impl<M> Mailbox<M> {
    /// A handle that does not keep the worker alive.
    pub fn downgrade(&self) -> WeakMailbox<M> {
        WeakMailbox {
            name: self.name,
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning mailbox, for tasks spawned by the worker itself.
pub struct WeakMailbox<M> {
    name: &'static str,
    tx: mpsc::WeakSender<M>,
}

impl<M> Clone for WeakMailbox<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<M> WeakMailbox<M> {
    /// `None` once every strong mailbox is gone.
    pub fn upgrade(&self) -> Option<Mailbox<M>> {
        self.tx.upgrade().map(|tx| Mailbox {
            name: self.name,
            tx,
        })
    }
}

/// Supervision bookkeeping for one spawned worker.
pub struct WorkerHandle {
    name: &'static str,
    restarts: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of times the worker has been rebuilt after a panic.
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::Relaxed)
    }

    /// True once the supervisor gave up or the mailbox closed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

enum Exit {
    Closed,
    Panicked(String),
}

/// Spawn a worker under supervision.
///
/// `factory` builds a fresh worker; it is called once at spawn and again for
/// every restart. Messages still queued when a worker panics are delivered to
/// its replacement.
pub fn spawn_supervised<W, F>(
    name: &'static str,
    capacity: usize,
    policy: SupervisionPolicy,
    factory: F,
) -> (Mailbox<W::Message>, WorkerHandle)
where
    W: Worker,
    F: Fn() -> W + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<W::Message>(capacity.max(1));
    let restarts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&restarts);

    let task = tokio::spawn(async move {
        let mut attempt = 0usize;
        loop {
            match run_worker(name, factory(), &mut rx).await {
                Exit::Closed => {
                    tracing::debug!(component = name, "worker stopped");
                    break;
                }
                Exit::Panicked(reason) => {
                    tracing::error!(component = name, %reason, "worker panicked");
                    if !policy.allows(attempt) {
                        tracing::error!(component = name, attempt, "restart budget exhausted, stopping worker");
                        break;
                    }
                    let delay = policy.strategy.delay_for_attempt(attempt);
                    attempt += 1;
                    counter.fetch_add(1, Ordering::Relaxed);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    tracing::warn!(component = name, attempt, "restarting worker");
                }
            }
        }
    });

    (
        Mailbox { name, tx },
        WorkerHandle {
            name,
            restarts,
            task,
        },
    )
}

async fn run_worker<W: Worker>(
    name: &'static str,
    mut worker: W,
    rx: &mut mpsc::Receiver<W::Message>,
) -> Exit {
    if let Err(panic) = AssertUnwindSafe(worker.started()).catch_unwind().await {
        return Exit::Panicked(panic_message(panic));
    }

    while let Some(msg) = rx.recv().await {
        match AssertUnwindSafe(worker.handle(msg)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(component = name, error = %e, code = e.code().as_str(), "message handling failed");
            }
            Err(panic) => return Exit::Panicked(panic_message(panic)),
        }
    }

    if AssertUnwindSafe(worker.stopped()).catch_unwind().await.is_err() {
        tracing::warn!(component = name, "panic in stop hook");
    }
    Exit::Closed
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    }
}

/// Enqueue `make()` into `mailbox` every `period` until the mailbox closes.
///
/// Ticks that find the mailbox full are skipped.
pub fn spawn_interval<M, F>(mailbox: Mailbox<M>, period: Duration, make: F) -> JoinHandle<()>
where
    M: Send + 'static,
    F: Fn() -> M + Send + 'static,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately; the initial run is triggered by the caller
        tick.tick().await;
        loop {
            tick.tick().await;
            if mailbox.is_closed() {
                break;
            }
            if let Err(e) = mailbox.try_send(make()) {
                tracing::debug!(component = mailbox.name(), error = %e, "interval tick skipped");
            }
        }
    })
}
