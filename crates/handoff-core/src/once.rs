//! Write-once / take-once cell
//!
//! The ownership of the value moves through a single atomic state word:
//!
//! ```text
//! EMPTY ──set()──▶ WRITING ──▶ SET ──take()──▶ TAKEN
//! ```
//!
//! Each transition is a compare-exchange, so exactly one writer and exactly
//! one taker can ever win. The writer's release store on `SET` pairs with the
//! taker's acquire exchange, which is what makes everything the writer did
//! before `set()` visible to the taker.

use crate::error::ReuseViolation;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const SET: u8 = 2;
const TAKEN: u8 = 3;

/// A cell that accepts one value and releases it once
pub struct OneShot<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
}

// Safety: the value is only touched by the thread that won the matching
// state transition.
unsafe impl<T: Send> Send for OneShot<T> {}
unsafe impl<T: Send> Sync for OneShot<T> {}

impl<T> OneShot<T> {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(None),
        }
    }

    /// Store the value. Fails if a value was ever stored before.
    pub fn set(&self, value: T) -> Result<(), ReuseViolation> {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(ReuseViolation::AlreadySet);
        }
        // Safety: WRITING is held by this thread only; takers wait for SET.
        unsafe {
            *self.value.get() = Some(value);
        }
        self.state.store(SET, Ordering::Release);
        Ok(())
    }

    /// Take the value if it is there.
    ///
    /// `Ok(None)` while nothing was stored yet.
    pub fn take(&self) -> Result<Option<T>, ReuseViolation> {
        match self
            .state
            .compare_exchange(SET, TAKEN, Ordering::Acquire, Ordering::Acquire)
        {
            // Safety: the SET -> TAKEN exchange is won by exactly one thread.
            Ok(_) => Ok(unsafe { (*self.value.get()).take() }),
            Err(TAKEN) => Err(ReuseViolation::AlreadyTaken),
            Err(_) => Ok(None),
        }
    }

    /// A value is stored and not yet taken.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) == SET
    }

    /// The value was stored and then taken.
    #[inline]
    pub fn is_taken(&self) -> bool {
        self.state.load(Ordering::Acquire) == TAKEN
    }
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Relaxed) {
            EMPTY => "empty",
            WRITING => "writing",
            SET => "set",
            _ => "taken",
        };
        f.debug_struct("OneShot").field("state", &state).finish()
    }
}
