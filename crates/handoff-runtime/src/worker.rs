//! Worker thread management
//!
//! Workers are OS threads that pull tasks from a `ThreadPool`. Each worker
//! records its index in a thread-local so code running on it (tasks,
//! callbacks, resumed sessions) can tell where it is.

use crate::pool::{PoolError, ThreadPool};
use std::cell::Cell;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

thread_local! {
    static CURRENT_WORKER: Cell<usize> = const { Cell::new(usize::MAX) };
}

pub(crate) fn set_current_worker(id: Option<usize>) {
    CURRENT_WORKER.with(|cell| cell.set(id.unwrap_or(usize::MAX)));
}

/// Index of the pool worker running on this thread, `None` off-pool.
#[inline]
pub fn current_worker() -> Option<usize> {
    let id = CURRENT_WORKER.with(|cell| cell.get());
    (id != usize::MAX).then_some(id)
}

/// Running worker threads of one pool
///
/// `join()` blocks until the pool is stopped and every worker has exited.
/// Dropping an un-joined group stops the pool and joins.
pub struct Workers {
    pool: Arc<ThreadPool>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Start `num_workers` threads named `handoff-worker-{i}`.
    ///
    /// If a thread cannot be spawned, the ones already running are stopped
    /// and joined before the error is returned.
    pub fn spawn(pool: &Arc<ThreadPool>, num_workers: usize) -> Result<Self, PoolError> {
        if num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let mut workers = Self {
            pool: Arc::clone(pool),
            handles: Vec::with_capacity(num_workers),
        };

        for worker_id in 0..num_workers {
            pool.worker_spawning();
            let worker_pool = Arc::clone(pool);
            let spawned = thread::Builder::new()
                .name(format!("handoff-worker-{}", worker_id))
                .spawn(move || worker_pool.work(worker_id));

            match spawned {
                Ok(handle) => workers.handles.push(handle),
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "handoff worker spawn failed");
                    pool.worker_exited();
                    workers.pool.stop();
                    workers.join_all();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        tracing::debug!(num_workers, "handoff workers started");
        Ok(workers)
    }

    /// Number of worker threads.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for all workers to finish. Someone must call `pool.stop()`.
    pub fn join(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("handoff worker thread panicked");
            }
        }
        self.pool.reject_stranded();
        tracing::debug!(count, "handoff workers joined");
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.pool.stop();
            self.join_all();
        }
    }
}
