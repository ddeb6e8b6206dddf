//! Background task scheduling.
//!
//! The engine never spawns threads of its own; every load runs as a future
//! handed to the host's [`TaskProcessor`]. Production hosts hand the work to
//! a tokio runtime; tests run tasks inline so a load completes before the
//! trigger call returns.

use futures::future::BoxFuture;

/// Schedules engine work onto the host's executor.
pub trait TaskProcessor: Send + Sync {
    /// Starts `task`, which must eventually run to completion. The engine
    /// never cancels a started task; stale loads are allowed to finish.
    fn start_task(&self, task: BoxFuture<'static, ()>);
}

/// [`TaskProcessor`] that spawns onto a tokio runtime.
pub struct TokioTaskProcessor {
    handle: tokio::runtime::Handle,
}

impl TokioTaskProcessor {
    /// Captures the current runtime. Panics outside a tokio runtime, same as
    /// [`tokio::runtime::Handle::current`].
    pub fn new() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl TaskProcessor for TokioTaskProcessor {
    fn start_task(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

/// [`TaskProcessor`] that runs each task to completion on the calling
/// thread. Deterministic, for tests; only usable with futures that do not
/// depend on an external reactor.
pub struct InlineTaskProcessor;

impl TaskProcessor for InlineTaskProcessor {
    fn start_task(&self, task: BoxFuture<'static, ()>) {
        futures::executor::block_on(task);
    }
}
