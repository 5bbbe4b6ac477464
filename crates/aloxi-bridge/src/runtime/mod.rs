//! Worker runtime: one mailbox per component, sequential processing,
//! supervised restart.
//!
//! Every bridge component runs as a `Worker` behind a bounded mailbox. A
//! supervising task owns the mailbox receiver and the worker factory, so a
//! worker that panics is rebuilt on the same queue while its peers keep
//! running.

mod supervisor;
mod worker;

pub use supervisor::{RestartStrategy, SupervisionPolicy};
pub use worker::{spawn_interval, spawn_supervised, Mailbox, WeakMailbox, Worker, WorkerHandle};
