//! Park/wake latch for a single completion
//!
//! The waiting thread is captured when the latch is created. `set()`
//! publishes the completion and unparks that thread once; `wait()` parks
//! until the completion is visible. `std::thread::park` keeps an unpark
//! token, so an unpark that lands between the check and the park is not lost.

use crate::error::{Completion, DispatchError};
use crate::once::OneShot;
use std::thread::{self, Thread};

/// One-shot completion latch bound to the creating thread
#[derive(Debug)]
pub struct Latch {
    cell: OneShot<Completion>,
    waiter: Thread,
}

impl Latch {
    /// Create a latch that the current thread will wait on.
    pub fn new() -> Self {
        Self {
            cell: OneShot::new(),
            waiter: thread::current(),
        }
    }

    /// Publish the completion and wake the waiter.
    ///
    /// # Panics
    ///
    /// A second delivery is a contract violation and panics.
    pub fn set(&self, completion: Completion) {
        if let Err(violation) = self.cell.set(completion) {
            tracing::error!(%violation, "latch delivered twice");
            panic!("handoff: completion delivered twice ({violation})");
        }
        self.waiter.unpark();
    }

    /// Completion if it already arrived. Does not block.
    pub fn try_wait(&self) -> Option<Completion> {
        match self.cell.take() {
            Ok(found) => found,
            Err(_) => Some(Err(DispatchError::Consumed)),
        }
    }

    /// Park until the completion arrives.
    ///
    /// Must be called from the thread that created the latch. Waiting twice
    /// yields `Err(DispatchError::Consumed)`.
    pub fn wait(&self) -> Completion {
        debug_assert_eq!(
            thread::current().id(),
            self.waiter.id(),
            "latch waited on from a foreign thread"
        );
        loop {
            if let Some(completion) = self.try_wait() {
                return completion;
            }
            thread::park();
        }
    }

    /// A completion was published and not yet consumed.
    pub fn is_set(&self) -> bool {
        self.cell.is_set()
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}
