//! Idle worker parking
//!
//! Workers park when the queue is empty; `submit` and `stop` wake them.
//!
//! The protocol is epoch based so a wake can never slip between a worker's
//! last queue check and its sleep:
//!
//! ```text
//! worker                              submitter
//! ──────                              ─────────
//! token = prepare()                   queue.push(task)
//! if queue non-empty → run it         wake_one()   // bumps the epoch
//! park(token, timeout)                             // sleeps only if the
//!                                                  // epoch is still `token`
//! ```

use std::time::Duration;

/// Platform-specific worker parking mechanism
pub trait WorkerParking: Send + Sync {
    /// Snapshot the wake epoch. Call before the final "is there work?" check.
    fn prepare(&self) -> u32;

    /// Sleep until woken, the timeout passes, or the epoch moved past `token`.
    ///
    /// Returns `true` if a wake was observed. Callers re-check for work
    /// regardless of the return value.
    fn park(&self, token: u32, timeout: Option<Duration>) -> bool;

    /// Wake one parked worker. Cheap when nobody is parked.
    fn wake_one(&self);

    /// Wake every parked worker (shutdown).
    fn wake_all(&self);

    /// Number of currently parked workers (hint, may be stale).
    fn parked_count(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn WorkerParking> {
    Box::new(PlatformParking::new())
}
