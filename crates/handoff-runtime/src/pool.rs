//! `ThreadPool`, the default `Executor`.
//!
//! Submitters push onto a bounded lock-free MPMC queue. Workers started by
//! `run_loop` / `Workers::spawn` pop and run tasks until the pool is stopped
//! and the queue is drained. Idle workers spin briefly, then park.
//!
//! No dynamic scaling, no task ordering. Simple, predictable, safe.

use crate::config::{ConfigError, PoolConfig};
use crate::parking::{new_parking, WorkerParking};
use crate::worker::{self, Workers};

use handoff_core::{Executor, RejectReason, Rejected, Task};

use crossbeam_queue::ArrayQueue;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Worker startup errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// `run_loop` was asked for zero workers
    #[error("at least one worker is required")]
    NoWorkers,

    /// The OS refused to create a worker thread
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks accepted by `submit`
    pub submitted: u64,
    /// Tasks whose body returned normally
    pub completed: u64,
    /// Tasks refused at submission or stranded at shutdown
    pub rejected: u64,
    /// Tasks whose body panicked
    pub panicked: u64,
    /// Tasks waiting in the queue
    pub pending: usize,
    /// Tasks running right now
    pub active: usize,
    /// Workers asleep in `park`
    pub parked: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

/// Fixed-size thread pool execution context
pub struct ThreadPool {
    /// Work queue: submitters → workers.
    queue: ArrayQueue<Task>,
    /// Idle worker sleep/wake.
    parking: Box<dyn WorkerParking>,
    /// Set once by `stop()`.
    stopped: AtomicBool,
    /// Tasks currently executing.
    active: AtomicUsize,
    /// Workers spawned and not yet exited.
    live: AtomicUsize,
    counters: Counters,
    config: PoolConfig,
}

impl ThreadPool {
    /// Create a pool. No threads are started until `start()` / `run_loop`.
    pub fn new(config: PoolConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        config.log();
        Ok(Arc::new(Self {
            queue: ArrayQueue::new(config.queue_capacity),
            parking: new_parking(),
            stopped: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            counters: Counters::default(),
            config,
        }))
    }

    /// Start `config.num_workers` workers without blocking.
    pub fn start(self: &Arc<Self>) -> Result<Workers, PoolError> {
        Workers::spawn(self, self.config.num_workers)
    }

    /// Stop accepting work. Workers finish what is queued, then exit.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::debug!(pending = self.queue.len(), "handoff pool stopping");
        }
        self.parking.wake_all();
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Tasks waiting in the queue.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            pending: self.queue.len(),
            active: self.active.load(Ordering::Relaxed),
            parked: self.parking.parked_count(),
        }
    }

    fn refuse(&self, reason: RejectReason, task: Task) -> Rejected {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(%reason, "handoff pool rejected task");
        Rejected::new(reason, task)
    }

    /// Count a worker before its thread starts.
    pub(crate) fn worker_spawning(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    /// Undo `worker_spawning` for a thread that never started, or mark a
    /// worker gone. The last one out sweeps the queue.
    pub(crate) fn worker_exited(&self) {
        let last = self.live.fetch_sub(1, Ordering::SeqCst) == 1;
        atomic::fence(Ordering::SeqCst);
        if last && self.is_stopped() {
            self.reject_stranded();
        }
    }

    /// Worker thread main loop.
    pub(crate) fn work(&self, worker_id: usize) {
        worker::set_current_worker(Some(worker_id));
        tracing::debug!(worker_id, "handoff worker started");

        let mut idle = 0u32;
        loop {
            if let Some(task) = self.queue.pop() {
                idle = 0;
                self.run_task(worker_id, task);
                continue;
            }

            if self.is_stopped() {
                break;
            }

            if idle < self.config.idle_spins {
                idle += 1;
                std::hint::spin_loop();
                continue;
            }

            let token = self.parking.prepare();
            if !self.queue.is_empty() || self.is_stopped() {
                continue;
            }
            self.parking.park(token, Some(self.config.park_timeout));
        }

        worker::set_current_worker(None);
        self.worker_exited();
        tracing::debug!(worker_id, "handoff worker exited");
    }

    fn run_task(&self, worker_id: usize, task: Task) {
        self.active.fetch_add(1, Ordering::Relaxed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()));
        self.active.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    worker_id,
                    panic = panic_message(payload.as_ref()),
                    "handoff task panicked"
                );
            }
        }
    }

    /// Reject whatever slipped into the queue after the last worker left.
    ///
    /// A submitter can pass the `stopped` check just before `stop()` and push
    /// after every worker saw an empty queue. Those tasks are refused here
    /// rather than dropped. Both the last exiting worker and such a late
    /// submitter call this, so whichever of them comes second finds the task.
    pub(crate) fn reject_stranded(&self) -> usize {
        let mut stranded = 0;
        while let Some(task) = self.queue.pop() {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            task.reject(RejectReason::Stopped);
            stranded += 1;
        }
        if stranded > 0 {
            tracing::warn!(stranded, "handoff pool rejected tasks queued after shutdown");
        }
        stranded
    }

    /// Queue a task that already passed the `stopped` check.
    fn enqueue(&self, task: Task) -> Result<(), Rejected> {
        if let Err(task) = self.queue.push(task) {
            return Err(self.refuse(RejectReason::Saturated, task));
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        atomic::fence(Ordering::SeqCst);
        if self.is_stopped() && self.live.load(Ordering::SeqCst) == 0 {
            // Lost the race with shutdown: no worker will ever pop this.
            self.reject_stranded();
            return Ok(());
        }
        self.parking.wake_one();
        Ok(())
    }
}

impl Executor for ThreadPool {
    fn submit(&self, task: Task) -> Result<(), Rejected> {
        if self.is_stopped() {
            return Err(self.refuse(RejectReason::Stopped, task));
        }
        self.enqueue(task)
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("stopped", &self.is_stopped())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        self.reject_stranded();
    }
}

/// Run `num_workers` workers on `pool` until it is stopped.
///
/// Blocks the calling thread. Another thread (or a task) must call
/// `pool.stop()`. Every worker is joined before this returns.
pub fn run_loop(pool: &Arc<ThreadPool>, num_workers: usize) -> Result<(), PoolError> {
    Workers::spawn(pool, num_workers)?.join();
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn small_pool(workers: usize, capacity: usize) -> Arc<ThreadPool> {
        ThreadPool::new(
            PoolConfig::new()
                .num_workers(workers)
                .queue_capacity(capacity)
                .park_timeout(Duration::from_millis(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_submit_runs_on_worker() {
        let pool = small_pool(2, 64);
        let workers = pool.start().unwrap();

        let (tx, rx) = mpsc::channel();
        pool.submit(Task::new(move || {
            tx.send(worker::current_worker()).unwrap();
        }))
        .unwrap();

        let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ran_on.is_some());
        assert_eq!(worker::current_worker(), None);

        pool.stop();
        workers.join();
        assert_eq!(pool.stats().completed, 1);
    }

    #[test]
    fn test_stopped_pool_rejects() {
        let pool = small_pool(1, 8);
        pool.stop();

        let err = pool.submit(Task::new(|| {})).unwrap_err();
        assert_eq!(err.reason, RejectReason::Stopped);
        assert_eq!(pool.stats().rejected, 1);
        assert_eq!(pool.stats().submitted, 0);
    }

    #[test]
    fn test_saturated_pool_rejects() {
        // No workers: nothing drains the queue.
        let pool = small_pool(1, 2);
        pool.submit(Task::new(|| {})).unwrap();
        pool.submit(Task::new(|| {})).unwrap();

        let err = pool.submit(Task::new(|| {})).unwrap_err();
        assert_eq!(err.reason, RejectReason::Saturated);
        assert_eq!(pool.pending(), 2);
    }

    #[test]
    fn test_run_loop_drains_then_returns() {
        let pool = small_pool(4, 1024);
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..500 {
            let hits = hits.clone();
            pool.submit(Task::new(move || {
                hits.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        }

        let stopper = {
            let pool = pool.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                pool.stop();
            })
        };

        run_loop(&pool, 4).unwrap();
        stopper.join().unwrap();

        assert_eq!(hits.load(Ordering::Relaxed), 500);
        assert_eq!(pool.stats().completed, 500);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_run_loop_requires_workers() {
        let pool = small_pool(1, 8);
        assert!(matches!(run_loop(&pool, 0), Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = small_pool(1, 8);
        let workers = pool.start().unwrap();

        pool.submit(Task::new(|| panic!("boom"))).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.submit(Task::new(move || tx.send(()).unwrap())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.stop();
        workers.join();
        let stats = pool.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_drop_rejects_stranded_tasks() {
        use handoff_core::Job;

        struct Tracer(mpsc::Sender<&'static str>);
        impl Job for Tracer {
            fn run(self: Box<Self>) {
                self.0.send("run").unwrap();
            }
            fn reject(self: Box<Self>, _reason: RejectReason) {
                self.0.send("rejected").unwrap();
            }
        }

        let (tx, rx) = mpsc::channel();
        let pool = small_pool(1, 8);
        pool.submit(Task::from_job(Tracer(tx))).unwrap();
        drop(pool);

        assert_eq!(rx.recv().unwrap(), "rejected");
    }

    #[test]
    fn test_push_after_last_worker_exit_is_rejected() {
        use handoff_core::Job;

        struct Outcome(mpsc::Sender<RejectReason>);
        impl Job for Outcome {
            fn run(self: Box<Self>) {
                panic!("ran after shutdown");
            }
            fn reject(self: Box<Self>, reason: RejectReason) {
                self.0.send(reason).unwrap();
            }
        }

        let pool = small_pool(1, 8);
        let workers = pool.start().unwrap();
        pool.stop();
        workers.join();

        // A submitter that passed the `stopped` check before `stop()` and
        // pushes only now, with every worker gone and the pool still alive.
        let (tx, rx) = mpsc::channel();
        pool.enqueue(Task::from_job(Outcome(tx))).unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)),
            Ok(RejectReason::Stopped)
        );
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.stats().rejected, 1);
    }

    #[test]
    fn test_last_worker_out_sweeps_queue() {
        let pool = small_pool(1, 8);
        pool.stop();
        // Stopped with no workers yet: the push is accepted and stays queued
        // until the last worker exits.
        pool.worker_spawning();
        let (tx, rx) = mpsc::channel();
        pool.enqueue(Task::new(move || tx.send(()).unwrap())).unwrap();
        assert_eq!(pool.pending(), 1);

        pool.worker_exited();
        assert_eq!(pool.pending(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(pool.stats().rejected, 1);
    }

    #[test]
    fn test_stats_report_parked_workers() {
        let pool = small_pool(2, 8);
        let workers = pool.start().unwrap();
        // Parked workers wake on every timeout, so sample until both are seen.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut both_parked = false;
        while !both_parked && std::time::Instant::now() < deadline {
            both_parked = pool.stats().parked == 2;
            thread::yield_now();
        }
        assert!(both_parked);

        pool.stop();
        workers.join();
        assert_eq!(pool.stats().parked, 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }
}
