//! Executor abstraction.
//!
//! An `Executor` accepts tasks for asynchronous execution. It is the only
//! thing the completion bridge knows about the execution context.
//!
//! # Implementors
//!
//! - `ThreadPool` (handoff-runtime): N OS threads pulling from a bounded
//!   lock-free MPMC queue.
//!
//! Anything that can run a closure later on some thread (an event loop, a
//! single dedicated worker) can implement this trait.

use crate::error::Rejected;
use crate::task::Task;
use std::sync::Arc;

/// Accepts tasks for eventual execution.
///
/// **Contract:**
/// - `submit()` must NEVER block the caller and must not rely on running
///   the task inline.
/// - An accepted task runs exactly once, on a thread owned by the
///   execution context.
/// - A refused task is handed back in `Rejected`; it is never dropped
///   silently. No ordering is promised between accepted tasks.
pub trait Executor: Send + Sync {
    /// Enqueue a task. Returns immediately.
    fn submit(&self, task: Task) -> Result<(), Rejected>;
}

impl<E: Executor + ?Sized> Executor for &E {
    #[inline]
    fn submit(&self, task: Task) -> Result<(), Rejected> {
        (**self).submit(task)
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    #[inline]
    fn submit(&self, task: Task) -> Result<(), Rejected> {
        (**self).submit(task)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    #[inline]
    fn submit(&self, task: Task) -> Result<(), Rejected> {
        (**self).submit(task)
    }
}
