//! Cooperative sessions
//!
//! A session is a `Future` driven by whichever thread wakes it. Its waker is
//! the resumption handle: waking an idle session polls it right there, on
//! the waking thread, so a computation suspended on a task resumes on the
//! worker that completed the task.
//!
//! ## State machine
//!
//! ```text
//!            wake                 Pending
//!   IDLE ─────────────▶ RUNNING ───────────▶ IDLE
//!                         │  ▲
//!                    wake │  │ re-poll
//!                         ▼  │
//!                       NOTIFIED
//!
//!   RUNNING ──Ready/panic──▶ DONE
//! ```
//!
//! A wake that lands while the session is being polled does not poll it a
//! second time concurrently; it leaves `NOTIFIED` behind and the thread that
//! is polling goes around once more before it lets go. Whichever side
//! arrives second does the work, so no wake is lost and no two threads
//! ever poll one session.

use handoff_core::{DispatchError, Executor, Rejected, Task};

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const NOTIFIED: u8 = 2;
const DONE: u8 = 3;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Start `future` as a session on `executor`.
///
/// The first poll is submitted as a task; later polls happen on whichever
/// thread wakes the session.
pub fn spawn<E, F>(executor: &E, future: F) -> Result<SessionHandle<F::Output>, Rejected>
where
    E: Executor + ?Sized,
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let output = Arc::new(Output::new());
    let session = Arc::new(Session {
        id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        state: AtomicU8::new(IDLE),
        future: Mutex::new(Some(future)),
        output: Arc::clone(&output),
    });
    tracing::trace!(session = session.id, "session spawned");

    let first = Arc::clone(&session);
    executor.submit(Task::new(move || first.resume()))?;

    Ok(SessionHandle {
        id: session.id,
        output,
    })
}

/// Owner's view of a spawned session
pub struct SessionHandle<T> {
    id: u64,
    output: Arc<Output<T>>,
}

impl<T> SessionHandle<T> {
    /// Process-unique id, as logged in `session` trace events.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the session finishes.
    ///
    /// `Err(DispatchError::Panicked)` if the session's future panicked.
    pub fn join(self) -> Result<T, DispatchError> {
        self.output.wait()
    }
}

struct Output<T> {
    value: Mutex<Option<Result<T, DispatchError>>>,
    ready: Condvar,
}

impl<T> Output<T> {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, result: Result<T, DispatchError>) {
        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *value = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<T, DispatchError> {
        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = value.take() {
                return result;
            }
            value = self
                .ready
                .wait(value)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Session<F: Future> {
    id: u64,
    state: AtomicU8,
    /// Pinned in place: the `Arc` allocation never moves and the future is
    /// only ever dropped in place.
    future: Mutex<Option<F>>,
    output: Arc<Output<F::Output>>,
}

impl<F> Session<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    /// Resumption entry point. Polls inline if the session was idle.
    fn resume(self: &Arc<Self>) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => RUNNING,
                RUNNING => NOTIFIED,
                _ => return,
            };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if next == RUNNING => break,
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
        self.run();
    }

    fn run(self: &Arc<Self>) {
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);

        loop {
            if self.poll_once(&mut cx) {
                self.state.store(DONE, Ordering::Release);
                tracing::trace!(session = self.id, "session finished");
                return;
            }

            match self.state.compare_exchange(
                RUNNING,
                IDLE,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(NOTIFIED) => {
                    tracing::trace!(session = self.id, "session woken while running");
                    self.state.store(RUNNING, Ordering::Release);
                }
                Err(other) => unreachable!("session {} in state {} while running", self.id, other),
            }
        }
    }

    /// Poll the future once. `true` once it is gone.
    fn poll_once(&self, cx: &mut Context<'_>) -> bool {
        let mut slot = self.future.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(future) = slot.as_mut() else {
            return true;
        };

        // Safety: the future sits inside the session's Arc allocation, is
        // never moved out, and is dropped in place below.
        let future = unsafe { Pin::new_unchecked(future) };
        let polled = panic::catch_unwind(AssertUnwindSafe(|| future.poll(cx)));

        let result = match polled {
            Ok(Poll::Pending) => return false,
            Ok(Poll::Ready(value)) => Ok(value),
            Err(_) => {
                tracing::error!(session = self.id, "session panicked");
                Err(DispatchError::Panicked)
            }
        };
        *slot = None;
        drop(slot);
        self.output.complete(result);
        true
    }
}

impl<F> Wake for Session<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn wake(self: Arc<Self>) {
        self.resume();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.resume();
    }
}
