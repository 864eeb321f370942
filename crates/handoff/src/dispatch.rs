//! Submit a task and route its completion through a token
//!
//! The task body is wrapped together with the token's notifier into one
//! `Job`. Whatever the executor does with that job, the notifier fires
//! exactly once:
//!
//! | Executor does            | Completion delivered                    |
//! |--------------------------|-----------------------------------------|
//! | runs it                  | `Ok(())`, after the body returned       |
//! | runs it, body panics     | `Err(Panicked)`, then the panic resumes |
//! | rejects it               | `Err(Rejected(reason))`                 |
//! | drops it without either  | `Err(Abandoned)`                        |
//!
//! A panicking body is caught inside the job so the notifier runs on a
//! thread that is not unwinding. The panic is re-raised afterwards and the
//! executor sees it as before.

use crate::token::{CompletionToken, LazySuspended, Notify};
use handoff_core::{Completion, DispatchError, Executor, Job, RejectReason, Task};

use std::panic::{self, AssertUnwindSafe};

/// Submit `task` to `executor` and report its completion through `token`.
///
/// The submission happens before this returns, for every token. The body
/// runs at most once; the completion is delivered exactly once and only
/// after the body has finished.
pub fn dispatch<E, F, T>(executor: &E, task: F, token: T) -> T::Output
where
    E: Executor + ?Sized,
    F: FnOnce() + Send + 'static,
    T: CompletionToken,
{
    let (notifier, receiver) = token.split();
    let submitted = submit_with(executor, task, notifier);
    T::receive(receiver, submitted)
}

/// Like `dispatch` with `Suspend`, but nothing is submitted until the
/// returned future is first polled.
///
/// The first poll registers the waker and only then submits, so the
/// computation is already suspended when the task can start. A rejection
/// resolves that same poll. Dropping the future unpolled never runs `task`.
pub fn dispatch_lazy<E, F>(executor: E, task: F) -> LazySuspended<E, F>
where
    E: Executor,
    F: FnOnce() + Send + 'static,
{
    LazySuspended::new(executor, task)
}

/// Wrap `task` with `notifier` and hand it to `executor`.
///
/// On rejection the notifier has already seen the error when this returns.
pub(crate) fn submit_with<E, F, N>(executor: &E, task: F, notifier: N) -> Result<(), DispatchError>
where
    E: Executor + ?Sized,
    F: FnOnce() + Send + 'static,
    N: Notify,
{
    let job = Wrapped {
        body: Some(task),
        notifier: Some(notifier),
    };

    executor
        .submit(Task::from_job(job))
        .map_err(|rejected| DispatchError::Rejected(rejected.into_reason()))
}

/// `dispatch` as a method on any executor.
pub trait ExecutorExt: Executor {
    fn dispatch<F, T>(&self, task: F, token: T) -> T::Output
    where
        F: FnOnce() + Send + 'static,
        T: CompletionToken,
    {
        dispatch(self, task, token)
    }

    fn dispatch_lazy<F>(&self, task: F) -> LazySuspended<&Self, F>
    where
        F: FnOnce() + Send + 'static,
    {
        dispatch_lazy(self, task)
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

struct Wrapped<F, N: Notify> {
    body: Option<F>,
    notifier: Option<N>,
}

impl<F, N: Notify> Wrapped<F, N> {
    fn deliver(&mut self, completion: Completion) {
        if let Some(notifier) = self.notifier.take() {
            notifier.notify(completion);
        }
    }
}

impl<F, N> Job for Wrapped<F, N>
where
    F: FnOnce() + Send + 'static,
    N: Notify,
{
    fn run(mut self: Box<Self>) {
        let Some(body) = self.body.take() else {
            return self.deliver(Ok(()));
        };
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(()) => self.deliver(Ok(())),
            Err(payload) => {
                self.deliver(Err(DispatchError::Panicked));
                drop(self);
                panic::resume_unwind(payload);
            }
        }
    }

    fn reject(mut self: Box<Self>, reason: RejectReason) {
        self.body = None;
        self.deliver(Err(DispatchError::Rejected(reason)));
    }
}

impl<F, N: Notify> Drop for Wrapped<F, N> {
    fn drop(&mut self) {
        if self.notifier.is_some() {
            tracing::warn!("task dropped without running or being rejected");
            self.deliver(Err(DispatchError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{callback, Blocking, Suspend};
    use handoff_core::Rejected;
    use handoff_runtime::{current_worker, session, PoolConfig, ThreadPool, Workers};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    fn pool(workers: usize) -> (Arc<ThreadPool>, Workers) {
        let pool = ThreadPool::new(
            PoolConfig::new()
                .num_workers(workers)
                .park_timeout(Duration::from_millis(5)),
        )
        .unwrap();
        let workers = pool.start().unwrap();
        (pool, workers)
    }

    /// Runs every task on a freshly spawned thread, right away.
    struct EagerThread;

    impl Executor for EagerThread {
        fn submit(&self, task: Task) -> Result<(), Rejected> {
            thread::spawn(move || task.run());
            Ok(())
        }
    }

    /// Accepts tasks and drops them.
    struct BlackHole;

    impl Executor for BlackHole {
        fn submit(&self, task: Task) -> Result<(), Rejected> {
            drop(task);
            Ok(())
        }
    }

    #[test]
    fn test_blocking_sees_task_effects() {
        let (pool, _workers) = pool(2);
        let value = Arc::new(AtomicUsize::new(0));
        let v = value.clone();

        let got = dispatch(&*pool, move || v.store(42, Ordering::Relaxed), Blocking);

        assert_eq!(got, Ok(()));
        assert_eq!(value.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn test_callback_runs_on_worker_after_task() {
        let (pool, _workers) = pool(2);
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        let ran = Arc::new(AtomicBool::new(false));

        let r = ran.clone();
        dispatch(
            &*pool,
            move || r.store(true, Ordering::Relaxed),
            callback(move |c| {
                let saw_effect = ran.load(Ordering::Relaxed);
                tx.send((c, saw_effect, current_worker(), thread::current().id()))
                    .unwrap();
            }),
        );

        let (completion, saw_effect, worker, thread_id) =
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion, Ok(()));
        assert!(saw_effect);
        assert!(worker.is_some());
        assert_ne!(thread_id, caller);
    }

    #[test]
    fn test_suspend_resolves_under_block_on() {
        let (pool, _workers) = pool(2);
        let value = Arc::new(AtomicUsize::new(0));
        let v = value.clone();

        let fut = pool.dispatch(move || v.store(9, Ordering::Relaxed), Suspend);
        assert_eq!(futures::executor::block_on(fut), Ok(()));
        assert_eq!(value.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn test_suspend_submits_before_first_poll() {
        let (pool, _workers) = pool(1);
        let (tx, rx) = mpsc::channel();

        let fut = dispatch(&*pool, move || tx.send(()).unwrap(), Suspend);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(futures::executor::block_on(fut), Ok(()));
    }

    #[test]
    fn test_session_resumes_on_completing_worker() {
        let (pool, _workers) = pool(4);
        let exec = pool.clone();

        let handle = session::spawn(&*pool, async move {
            let mut resumed_on_worker = 0;
            for _ in 0..100 {
                exec.dispatch(|| {}, Suspend).await.unwrap();
                if current_worker().is_some() {
                    resumed_on_worker += 1;
                }
            }
            resumed_on_worker
        })
        .unwrap();

        assert_eq!(handle.join(), Ok(100));
    }

    #[test]
    fn test_rejected_by_stopped_pool() {
        let pool = ThreadPool::new(PoolConfig::new().num_workers(1)).unwrap();
        pool.stop();
        let stopped = Err(DispatchError::Rejected(RejectReason::Stopped));
        let ran = Arc::new(AtomicBool::new(false));

        // No worker exists, so waiting here would hang.
        let r = ran.clone();
        assert_eq!(
            dispatch(&*pool, move || r.store(true, Ordering::SeqCst), Blocking),
            stopped
        );

        let delivered = Arc::new(AtomicUsize::new(0));
        let d = delivered.clone();
        dispatch(
            &*pool,
            || {},
            callback(move |c| {
                assert_eq!(c, Err(DispatchError::Rejected(RejectReason::Stopped)));
                d.fetch_add(1, Ordering::SeqCst);
            }),
        );
        // Rejection is reported synchronously on the dispatching thread.
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        let fut = dispatch(&*pool, || {}, Suspend);
        assert!(fut.is_ready());
        assert_eq!(futures::executor::block_on(fut), stopped);

        assert!(!ran.load(Ordering::SeqCst));
        let stats = pool.stats();
        assert_eq!(stats.submitted, 0);
        assert_eq!(stats.rejected, 3);
    }

    #[test]
    fn test_rejected_when_saturated() {
        let pool = ThreadPool::new(PoolConfig::new().num_workers(1).queue_capacity(1)).unwrap();

        let first = Arc::new(AtomicUsize::new(0));
        let f = first.clone();
        dispatch(
            &*pool,
            || {},
            callback(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        // Queued, not yet run: nothing delivered.
        assert_eq!(first.load(Ordering::SeqCst), 0);

        assert_eq!(
            dispatch(&*pool, || {}, Blocking),
            Err(DispatchError::Rejected(RejectReason::Saturated))
        );

        // The queued one completes once a worker drains it.
        pool.stop();
        let workers = Workers::spawn(&pool, 1).unwrap();
        workers.join();
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_task_is_abandoned() {
        assert_eq!(
            dispatch(&BlackHole, || {}, Blocking),
            Err(DispatchError::Abandoned)
        );
        let fut = dispatch(&BlackHole, || {}, Suspend);
        assert_eq!(futures::executor::block_on(fut), Err(DispatchError::Abandoned));
    }

    #[test]
    fn test_panicking_task_reports_failure() {
        let (pool, workers) = pool(1);
        let got = dispatch(&*pool, || panic!("task body"), Blocking);
        assert_eq!(got, Err(DispatchError::Panicked));

        // The worker survived the panic.
        assert_eq!(dispatch(&*pool, || {}, Blocking), Ok(()));

        pool.stop();
        workers.join();
        assert_eq!(pool.stats().panicked, 1);
    }

    #[test]
    fn test_panicking_callback_after_panicking_task() {
        let (pool, workers) = pool(1);
        let (tx, rx) = mpsc::channel();

        dispatch(
            &*pool,
            || panic!("task body"),
            callback(move |c: Completion| {
                tx.send((c, thread::panicking())).unwrap();
                c.unwrap();
            }),
        );

        let (completion, unwinding) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion, Err(DispatchError::Panicked));
        assert!(!unwinding);

        // The callback's own panic was caught like any task panic.
        assert_eq!(dispatch(&*pool, || {}, Blocking), Ok(()));
        pool.stop();
        workers.join();
        assert_eq!(pool.stats().panicked, 1);
    }

    #[test]
    fn test_session_resumes_outside_unwinding_after_panic() {
        let (pool, _workers) = pool(2);
        let exec = pool.clone();

        let handle = session::spawn(&*pool, async move {
            let got = exec.dispatch(|| panic!("task body"), Suspend).await;
            (got, thread::panicking(), current_worker().is_some())
        })
        .unwrap();

        assert_eq!(handle.join(), Ok((Err(DispatchError::Panicked), false, true)));
    }

    #[test]
    fn test_lazy_waits_for_first_poll() {
        let (pool, _workers) = pool(1);
        let (tx, rx) = mpsc::channel();

        let fut = pool.dispatch_lazy(move || tx.send(()).unwrap());
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
        assert_eq!(pool.stats().submitted, 0);

        assert_eq!(futures::executor::block_on(fut), Ok(()));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_lazy_dropped_unpolled_never_runs() {
        let (pool, workers) = pool(1);
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();

        drop(dispatch_lazy(&*pool, move || r.store(true, Ordering::SeqCst)));

        pool.stop();
        workers.join();
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(pool.stats().submitted, 0);
    }

    #[test]
    fn test_lazy_rejection_resolves_first_poll() {
        let pool = ThreadPool::new(PoolConfig::new().num_workers(1)).unwrap();
        pool.stop();

        let fut = dispatch_lazy(&*pool, || {});
        assert_eq!(pool.stats().rejected, 0);
        assert_eq!(
            futures::executor::block_on(fut),
            Err(DispatchError::Rejected(RejectReason::Stopped))
        );
        assert_eq!(pool.stats().rejected, 1);
    }

    #[test]
    fn test_tasks_queued_at_shutdown_are_rejected() {
        let pool = ThreadPool::new(PoolConfig::new().num_workers(1)).unwrap();
        let (tx, rx) = mpsc::channel();
        for _ in 0..3 {
            let tx = tx.clone();
            dispatch(&*pool, || {}, callback(move |c| tx.send(c).unwrap()));
        }
        drop(pool);

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got, vec![Err(DispatchError::Rejected(RejectReason::Stopped)); 3]);
    }

    #[test]
    fn test_suspension_race_with_eager_executor() {
        // The task may finish before, during or after the first poll
        // registers its waker. Every iteration must resume exactly once.
        for i in 0..10_000 {
            let flag = Arc::new(AtomicBool::new(false));
            let f = flag.clone();
            let fut = dispatch(&EagerThread, move || f.store(true, Ordering::Relaxed), Suspend);
            assert_eq!(futures::executor::block_on(fut), Ok(()), "iteration {i}");
            assert!(flag.load(Ordering::Relaxed), "iteration {i}");
        }
    }

    #[test]
    fn test_suspension_race_inside_session() {
        let (pool, _workers) = pool(4);
        let exec = pool.clone();
        let resumed = Arc::new(AtomicUsize::new(0));
        let r = resumed.clone();

        let handle = session::spawn(&*pool, async move {
            for i in 0..10_000usize {
                let seen = Arc::new(AtomicUsize::new(0));
                let s = seen.clone();
                exec.dispatch(move || s.store(i + 1, Ordering::Relaxed), Suspend)
                    .await
                    .unwrap();
                assert_eq!(seen.load(Ordering::Relaxed), i + 1);
                r.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();

        assert_eq!(handle.join(), Ok(()));
        assert_eq!(resumed.load(Ordering::Relaxed), 10_000);
    }

    #[test]
    fn test_lazy_suspension_race_with_eager_executor() {
        for i in 0..10_000 {
            let flag = Arc::new(AtomicBool::new(false));
            let f = flag.clone();
            let fut = dispatch_lazy(&EagerThread, move || f.store(true, Ordering::Relaxed));
            assert_eq!(futures::executor::block_on(fut), Ok(()), "iteration {i}");
            assert!(flag.load(Ordering::Relaxed), "iteration {i}");
        }
    }

    #[test]
    fn test_lazy_suspension_race_inside_session() {
        let (pool, _workers) = pool(4);
        let exec = pool.clone();

        let handle = session::spawn(&*pool, async move {
            let mut resumed = 0usize;
            for i in 0..10_000usize {
                let seen = Arc::new(AtomicUsize::new(0));
                let s = seen.clone();
                exec.dispatch_lazy(move || s.store(i + 1, Ordering::Relaxed))
                    .await
                    .unwrap();
                assert_eq!(seen.load(Ordering::Relaxed), i + 1);
                resumed += 1;
            }
            resumed
        })
        .unwrap();

        assert_eq!(handle.join(), Ok(10_000));
    }

    #[test]
    fn test_stress_dependent_sessions() {
        const SESSIONS: usize = 1_000;
        const STEPS: usize = 100;

        let (pool, workers) = pool(8);
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..SESSIONS)
            .map(|_| {
                let exec = pool.clone();
                let total = total.clone();
                session::spawn(&*pool, async move {
                    let local = Arc::new(AtomicUsize::new(0));
                    for step in 0..STEPS {
                        let l = local.clone();
                        let t = total.clone();
                        exec.dispatch(
                            move || {
                                l.fetch_add(1, Ordering::Relaxed);
                                t.fetch_add(1, Ordering::Relaxed);
                            },
                            Suspend,
                        )
                        .await
                        .unwrap();
                        // Each step observes exactly the steps before it.
                        assert_eq!(local.load(Ordering::Relaxed), step + 1);
                    }
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join(), Ok(()));
        }
        assert_eq!(total.load(Ordering::Relaxed), SESSIONS * STEPS);

        pool.stop();
        workers.join();
        let stats = pool.stats();
        // One task per dispatch plus each session's first poll.
        assert_eq!(stats.completed as usize, SESSIONS * STEPS + SESSIONS);
        assert_eq!(stats.panicked, 0);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn test_stress_callback_chains() {
        const CHAINS: usize = 200;
        const STEPS: usize = 100;

        fn step(pool: Arc<ThreadPool>, left: usize, done: mpsc::Sender<usize>) {
            if left == 0 {
                done.send(STEPS).unwrap();
                return;
            }
            let next = pool.clone();
            dispatch(
                &*pool,
                || {},
                callback(move |c| {
                    c.unwrap();
                    step(next, left - 1, done);
                }),
            );
        }

        let (pool, _workers) = pool(8);
        let (tx, rx) = mpsc::channel();
        for _ in 0..CHAINS {
            step(pool.clone(), STEPS, tx.clone());
        }
        drop(tx);

        let finished: usize = rx.iter().take(CHAINS).sum();
        assert_eq!(finished, CHAINS * STEPS);
    }

    #[test]
    fn test_blocking_from_many_threads() {
        let (pool, _workers) = pool(4);
        let count = Arc::new(AtomicUsize::new(0));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let count = count.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let c = count.clone();
                        let before = c.load(Ordering::Relaxed);
                        let task = move || {
                            c.fetch_add(1, Ordering::Relaxed);
                        };
                        pool.dispatch(task, Blocking).unwrap();
                        assert!(count.load(Ordering::Relaxed) > before);
                    }
                })
            })
            .collect();

        for caller in callers {
            caller.join().unwrap();
        }
        assert_eq!(count.load(Ordering::Relaxed), 8 * 500);
    }
}
