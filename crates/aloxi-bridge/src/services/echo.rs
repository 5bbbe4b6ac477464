//! Echo/Health Processor.
//!
//! `send_echo` publishes an `echoRequest` carrying a fresh token and waits for
//! the `echoResponse` with the same token. Correlations are keyed by token, so
//! concurrent echoes do not orphan each other. Consumed and abandoned tokens
//! are remembered for a while: at-least-once delivery means the same response
//! can arrive twice, and a response can arrive after its caller gave up.
//! An echo whose caller went away (timed out, or the future was dropped) is
//! pruned before the next message is handled, so it never absorbs a response
//! meant for a live echo.
//!
//! The processor also answers `echoRequest` envelopes from the other side of
//! the channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use aloxi_core::error::{AloxiError, Result};
use aloxi_core::protocol::{ops, Envelope};

use crate::dispatch::OperationHandler;
use crate::runtime::{spawn_supervised, Mailbox, SupervisionPolicy, Worker, WorkerHandle};
use crate::transport::TransportManager;

pub const COMPONENT: &str = "echo";

const RETIRED_CAPACITY: usize = 64;

/// Result of a completed echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoOutcome {
    /// The response carried our token.
    Match { token: String, round_trip: Duration },
    /// A response arrived, but with a token we never issued.
    Mismatch { expected: String, received: String },
}

impl EchoOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, EchoOutcome::Match { .. })
    }
}

pub enum EchoMsg {
    Start {
        token: String,
        waiter: oneshot::Sender<Result<EchoOutcome>>,
    },
    Abandon {
        token: String,
    },
    Inbound(Envelope),
    Pending {
        reply: oneshot::Sender<usize>,
    },
}

impl From<Envelope> for EchoMsg {
    fn from(env: Envelope) -> Self {
        EchoMsg::Inbound(env)
    }
}

/// Cloneable handle to the echo worker.
#[derive(Clone)]
pub struct EchoProcessor {
    mailbox: Mailbox<EchoMsg>,
}

impl EchoProcessor {
    pub fn spawn(
        transport: TransportManager,
        capacity: usize,
        policy: SupervisionPolicy,
    ) -> (Self, WorkerHandle) {
        let (mailbox, handle) = spawn_supervised(COMPONENT, capacity, policy, move || {
            EchoWorker::new(transport.clone())
        });
        (Self { mailbox }, handle)
    }

    /// Send an echo request. Times out with `AloxiError::Timeout` after `deadline`.
    pub async fn send_echo(&self, deadline: Duration) -> Result<EchoOutcome> {
        let token = Uuid::new_v4().to_string();
        let (waiter, outcome) = oneshot::channel();
        self.mailbox
            .send(EchoMsg::Start {
                token: token.clone(),
                waiter,
            })
            .await?;

        match tokio::time::timeout(deadline, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AloxiError::Unavailable("echo dropped the request".into())),
            Err(_) => {
                // the publish stays in flight; a late response is discarded
                let _ = self.mailbox.try_send(EchoMsg::Abandon { token });
                Err(AloxiError::Timeout)
            }
        }
    }

    /// Number of echoes whose caller is still awaiting a response.
    pub async fn pending(&self) -> Result<usize> {
        self.mailbox.ask(|reply| EchoMsg::Pending { reply }).await
    }

    /// Registry handler for `echoResponse` / `echoRequest`.
    pub fn handler(&self) -> Arc<dyn OperationHandler> {
        Arc::new(self.mailbox.clone())
    }
}

struct PendingEcho {
    waiter: oneshot::Sender<Result<EchoOutcome>>,
    issued_at: Instant,
}

struct EchoWorker {
    transport: TransportManager,
    pending: HashMap<String, PendingEcho>,
    // issue order of pending tokens, oldest first
    order: VecDeque<String>,
    retired: VecDeque<String>,
}

impl EchoWorker {
    fn new(transport: TransportManager) -> Self {
        Self {
            transport,
            pending: HashMap::new(),
            order: VecDeque::new(),
            retired: VecDeque::with_capacity(RETIRED_CAPACITY),
        }
    }

    fn retire(&mut self, token: String) {
        if self.retired.len() == RETIRED_CAPACITY {
            self.retired.pop_front();
        }
        self.retired.push_back(token);
    }

    fn take(&mut self, token: &str) -> Option<PendingEcho> {
        self.order.retain(|t| t != token);
        self.pending.remove(token)
    }

    /// Oldest echo whose caller is still waiting.
    fn take_oldest(&mut self) -> Option<(String, PendingEcho)> {
        while let Some(token) = self.order.pop_front() {
            match self.pending.remove(&token) {
                Some(p) if !p.waiter.is_closed() => return Some((token, p)),
                Some(_) => self.retire(token),
                None => {}
            }
        }
        None
    }

    /// Drop echoes whose caller is gone (deadline passed or future dropped).
    fn prune(&mut self) {
        let gone: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.waiter.is_closed())
            .map(|(token, _)| token.clone())
            .collect();
        for token in gone {
            tracing::debug!(%token, "echo abandoned by caller");
            self.take(&token);
            self.retire(token);
        }
    }

    async fn start(&mut self, token: String, waiter: oneshot::Sender<Result<EchoOutcome>>) {
        let env = Envelope::new(ops::ECHO_REQUEST, Value::String(token.clone()));
        self.pending.insert(
            token.clone(),
            PendingEcho {
                waiter,
                issued_at: Instant::now(),
            },
        );
        self.order.push_back(token.clone());

        if let Err(e) = self.transport.publish(env).await {
            if let Some(p) = self.take(&token) {
                let _ = p.waiter.send(Err(e));
            }
            self.retire(token);
        }
    }

    fn resolve(&mut self, data: &Value) {
        let received = match data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        if let Some(p) = self.take(&received) {
            let outcome = EchoOutcome::Match {
                token: received.clone(),
                round_trip: p.issued_at.elapsed(),
            };
            tracing::debug!(token = %received, "echo matched");
            let _ = p.waiter.send(Ok(outcome));
            self.retire(received);
            return;
        }

        if self.retired.contains(&received) {
            tracing::debug!(token = %received, "duplicate or late echo response ignored");
            return;
        }

        match self.take_oldest() {
            Some((expected, p)) => {
                tracing::warn!(%expected, %received, "echo token mismatch");
                let _ = p.waiter.send(Ok(EchoOutcome::Mismatch {
                    expected: expected.clone(),
                    received,
                }));
                self.retire(expected);
            }
            None => {
                tracing::debug!(token = %received, "unsolicited echo response ignored");
            }
        }
    }

    async fn answer(&self, env: Envelope) -> Result<()> {
        let reply = Envelope::new(ops::ECHO_RESPONSE, env.data);
        self.transport.publish(reply).await.map(|_| ())
    }
}

#[async_trait]
impl Worker for EchoWorker {
    type Message = EchoMsg;

    async fn handle(&mut self, msg: EchoMsg) -> Result<()> {
        self.prune();
        match msg {
            EchoMsg::Start { token, waiter } => self.start(token, waiter).await,
            EchoMsg::Abandon { token } => {
                if self.take(&token).is_some() {
                    tracing::debug!(%token, "echo abandoned after deadline");
                    self.retire(token);
                }
            }
            EchoMsg::Inbound(env) => match env.operation.clone().as_str() {
                ops::ECHO_RESPONSE => self.resolve(&env.data),
                ops::ECHO_REQUEST => return self.answer(env).await,
                other => {
                    return Err(AloxiError::BadRequest(format!(
                        "echo cannot handle operation {other}"
                    )))
                }
            },
            EchoMsg::Pending { reply } => {
                let _ = reply.send(self.pending.len());
            }
        }
        Ok(())
    }
}
