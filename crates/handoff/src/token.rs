//! Completion tokens
//!
//! A token decides how the outcome of a dispatched task reaches the caller.
//! `dispatch` splits the token into two halves:
//!
//! ```text
//!   token ──split──▶ Notifier ──(travels with the task)──▶ notify(completion)
//!                 └▶ Receiver ──(stays with the caller)──▶ receive() ─▶ Output
//! ```
//!
//! | Token          | Notifier           | Output                            |
//! |----------------|--------------------|-----------------------------------|
//! | `Blocking`     | `Arc<Latch>`       | `Result<(), DispatchError>`       |
//! | `Callback<F>`  | the callback       | `()`                              |
//! | `Suspend`      | `Arc<SuspendSlot>` | `Suspended`, a `Future`           |
//!
//! `dispatch_lazy` is the deferred form of `Suspend`: it returns a
//! `LazySuspended` future that submits on its first poll.
//!
//! The notifier is consumed by `notify`, so a completion is delivered at
//! most once by construction. Tokens themselves are moved into `dispatch`
//! and cannot be reused.

use crate::dispatch::submit_with;
use handoff_core::{Completion, DispatchError, Executor, Latch, OneShot};

use futures::task::AtomicWaker;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Producer half of a token: receives the task's completion exactly once.
pub trait Notify: Send + 'static {
    fn notify(self, completion: Completion);
}

/// How a dispatch reports back.
pub trait CompletionToken {
    /// Travels with the task to the executor.
    type Notifier: Notify;
    /// Stays with the caller.
    type Receiver;
    /// What `dispatch` returns.
    type Output;

    fn split(self) -> (Self::Notifier, Self::Receiver);

    /// Turn the receiver into the caller-visible result.
    ///
    /// `submitted` is the submission outcome. On `Err` the notifier has
    /// already been handed the same error.
    fn receive(receiver: Self::Receiver, submitted: Result<(), DispatchError>) -> Self::Output;
}

// ============================================================================
// Blocking
// ============================================================================

/// Park the calling thread until the task finishes.
///
/// A rejected submission returns its error immediately, without parking.
///
/// Blocking on a pool from one of that pool's own workers can deadlock when
/// no other worker is free to run the task.
#[derive(Debug, Default)]
pub struct Blocking;

impl Notify for Arc<Latch> {
    #[inline]
    fn notify(self, completion: Completion) {
        self.set(completion);
    }
}

impl CompletionToken for Blocking {
    type Notifier = Arc<Latch>;
    type Receiver = Arc<Latch>;
    type Output = Completion;

    fn split(self) -> (Arc<Latch>, Arc<Latch>) {
        let latch = Arc::new(Latch::new());
        (Arc::clone(&latch), latch)
    }

    fn receive(latch: Arc<Latch>, submitted: Result<(), DispatchError>) -> Completion {
        submitted?;
        latch.wait()
    }
}

// ============================================================================
// Callback
// ============================================================================

/// Invoke a function with the completion, on whatever thread produces it.
///
/// That is the worker that ran the task, or the dispatching thread itself
/// when the submission is rejected.
pub struct Callback<F>(pub F);

/// Shorthand for `Callback(f)`.
pub fn callback<F>(f: F) -> Callback<F>
where
    F: FnOnce(Completion) + Send + 'static,
{
    Callback(f)
}

impl<F> Notify for Callback<F>
where
    F: FnOnce(Completion) + Send + 'static,
{
    #[inline]
    fn notify(self, completion: Completion) {
        (self.0)(completion)
    }
}

impl<F> CompletionToken for Callback<F>
where
    F: FnOnce(Completion) + Send + 'static,
{
    type Notifier = Self;
    type Receiver = ();
    type Output = ();

    fn split(self) -> (Self, ()) {
        (self, ())
    }

    fn receive(_: (), _: Result<(), DispatchError>) {}
}

impl<F> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

// ============================================================================
// Suspend (eager and lazy)
// ============================================================================

/// Return a future that resolves with the completion.
///
/// The task is submitted when `dispatch` is called, not on first poll.
/// The future resumes whichever context polls it: inside a session that is
/// the thread that completed the task.
#[derive(Debug, Default)]
pub struct Suspend;

/// Meeting point between a finished task and a suspended computation
///
/// The completion is published before the waker is fired, and the future
/// re-checks after registering, so a completion that lands between "check"
/// and "register" is seen either way.
pub struct SuspendSlot {
    cell: OneShot<Completion>,
    waker: AtomicWaker,
}

impl SuspendSlot {
    fn new() -> Self {
        Self {
            cell: OneShot::new(),
            waker: AtomicWaker::new(),
        }
    }

    fn try_take(&self) -> Option<Completion> {
        match self.cell.take() {
            Ok(found) => found,
            Err(_) => Some(Err(DispatchError::Consumed)),
        }
    }
}

impl Notify for Arc<SuspendSlot> {
    fn notify(self, completion: Completion) {
        if let Err(violation) = self.cell.set(completion) {
            tracing::error!(%violation, "suspend slot delivered twice");
            panic!("handoff: completion delivered twice ({violation})");
        }
        self.waker.wake();
    }
}

impl fmt::Debug for SuspendSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendSlot")
            .field("set", &self.cell.is_set())
            .field("taken", &self.cell.is_taken())
            .finish()
    }
}

impl CompletionToken for Suspend {
    type Notifier = Arc<SuspendSlot>;
    type Receiver = Arc<SuspendSlot>;
    type Output = Suspended;

    fn split(self) -> (Arc<SuspendSlot>, Arc<SuspendSlot>) {
        let slot = Arc::new(SuspendSlot::new());
        (Arc::clone(&slot), slot)
    }

    fn receive(slot: Arc<SuspendSlot>, _submitted: Result<(), DispatchError>) -> Suspended {
        // A rejection already filled the slot; the first poll returns it.
        Suspended { slot, done: false }
    }
}

/// Future returned by a `Suspend` dispatch
///
/// Polling again after it resolved yields `Err(DispatchError::Consumed)`.
#[must_use = "futures do nothing unless polled, but the task was already submitted"]
pub struct Suspended {
    slot: Arc<SuspendSlot>,
    done: bool,
}

impl Suspended {
    /// The completion has arrived and was not yet observed.
    pub fn is_ready(&self) -> bool {
        !self.done && self.slot.cell.is_set()
    }
}

impl Future for Suspended {
    type Output = Completion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Completion> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(Err(DispatchError::Consumed));
        }

        if let Some(completion) = this.slot.try_take() {
            this.done = true;
            return Poll::Ready(completion);
        }

        this.slot.waker.register(cx.waker());

        match this.slot.try_take() {
            Some(completion) => {
                this.done = true;
                Poll::Ready(completion)
            }
            None => Poll::Pending,
        }
    }
}

impl fmt::Debug for Suspended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspended")
            .field("ready", &self.is_ready())
            .field("done", &self.done)
            .finish()
    }
}

/// Future returned by `dispatch_lazy`
///
/// Holds the executor and the task until the first poll.
#[must_use = "the task is not submitted until this future is polled"]
pub struct LazySuspended<E, F> {
    initiation: Option<(E, F)>,
    suspended: Option<Suspended>,
}

// Neither the executor nor the task is ever pinned; both are moved out
// on the first poll.
impl<E, F> Unpin for LazySuspended<E, F> {}

impl<E, F> LazySuspended<E, F> {
    pub(crate) fn new(executor: E, task: F) -> Self {
        Self {
            initiation: Some((executor, task)),
            suspended: None,
        }
    }

    /// Whether the task has been handed to the executor yet.
    pub fn is_submitted(&self) -> bool {
        self.suspended.is_some()
    }
}

impl<E, F> Future for LazySuspended<E, F>
where
    E: Executor,
    F: FnOnce() + Send + 'static,
{
    type Output = Completion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Completion> {
        let this = self.get_mut();

        if let Some((executor, task)) = this.initiation.take() {
            let (notifier, slot) = Suspend.split();
            slot.waker.register(cx.waker());
            if let Err(error) = submit_with(&executor, task, notifier) {
                tracing::trace!(%error, "lazy dispatch rejected on first poll");
            }
            this.suspended = Some(Suspend::receive(slot, Ok(())));
        }

        match this.suspended.as_mut() {
            Some(suspended) => Pin::new(suspended).poll(cx),
            None => Poll::Ready(Err(DispatchError::Consumed)),
        }
    }
}

impl<E, F> fmt::Debug for LazySuspended<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySuspended")
            .field("submitted", &self.is_submitted())
            .field("suspended", &self.suspended)
            .finish()
    }
}
