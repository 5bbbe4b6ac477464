use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use aloxi_core::error::Result;
use aloxi_core::protocol::Envelope;

use crate::runtime::Mailbox;

/// Handler for one operation key.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, env: Envelope) -> Result<()>;
}

/// A worker mailbox is a handler: the envelope is queued, never processed inline.
#[async_trait]
impl<M> OperationHandler for Mailbox<M>
where
    M: From<Envelope> + Send + 'static,
{
    async fn handle(&self, env: Envelope) -> Result<()> {
        self.try_send(M::from(env))
    }
}

/// What happened to one dispatched envelope.
#[derive(Debug)]
pub enum DispatchOutcome {
    Delivered,
    NoHandler,
    HandlerFailed(aloxi_core::AloxiError),
}

/// Operation key -> handler. Last registration for a key wins.
#[derive(Default)]
pub struct OperationRegistry {
    handlers: DashMap<String, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Upsert. Returns true when an existing handler was replaced.
    pub fn register(&self, operation: impl Into<String>, handler: Arc<dyn OperationHandler>) -> bool {
        self.handlers.insert(operation.into(), handler).is_some()
    }

    pub fn unregister(&self, operation: &str) -> bool {
        self.handlers.remove(operation).is_some()
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }

    pub fn registered_operations(&self) -> Vec<String> {
        let mut ops: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        ops.sort();
        ops
    }

    /// Route to the registered handler. Never returns an error.
    pub async fn dispatch(&self, env: Envelope) -> DispatchOutcome {
        // clone out of the map so no shard lock is held across the await
        let handler = match self.handlers.get(env.operation.as_str()) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                tracing::warn!(operation = %env.operation, "no handler registered, discarding");
                return DispatchOutcome::NoHandler;
            }
        };

        let operation = env.operation.clone();
        match handler.handle(env).await {
            Ok(()) => DispatchOutcome::Delivered,
            Err(e) => {
                tracing::warn!(operation = %operation, error = %e, "handler rejected envelope");
                DispatchOutcome::HandlerFailed(e)
            }
        }
    }
}
