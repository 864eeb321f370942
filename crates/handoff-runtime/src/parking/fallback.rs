//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support. Same epoch protocol as the
//! futex version; the mutex makes "check epoch, then wait" atomic with
//! respect to a waker that bumped the epoch before notifying.

use super::WorkerParking;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Condvar-based parking (fallback)
pub struct FallbackParking {
    epoch: AtomicU32,
    lock: Mutex<()>,
    condvar: Condvar,
    parked: AtomicUsize,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    fn wake(&self, all: bool) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner));
        if all {
            self.condvar.notify_all();
        } else {
            self.condvar.notify_one();
        }
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FallbackParking {
    #[inline]
    fn prepare(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn park(&self, token: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);

        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) == token {
            match timeout {
                Some(t) => {
                    let _ = self
                        .condvar
                        .wait_timeout(guard, t)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => {
                    let _ = self
                        .condvar
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        self.parked.fetch_sub(1, Ordering::SeqCst);
        self.epoch.load(Ordering::SeqCst) != token
    }

    fn wake_one(&self) {
        self.wake(false);
    }

    fn wake_all(&self) {
        self.wake(true);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
