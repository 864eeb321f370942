//! Linux futex-based worker parking
//!
//! The futex word is the wake epoch. Parking is `FUTEX_WAIT(epoch, token)`,
//! which the kernel refuses if the epoch already moved. Waking bumps the
//! epoch first and only then issues `FUTEX_WAKE`, and only if someone is
//! registered as parked.

use super::WorkerParking;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Linux futex-based parking
pub struct FutexParking {
    /// Futex word: wake epoch
    epoch: AtomicU32,

    /// Count of parked workers
    parked: AtomicUsize,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn futex_wake(&self, n: i32) {
        // Safety: the futex word lives as long as `self`.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                n,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn wake(&self, n: i32) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        self.futex_wake(n);
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FutexParking {
    #[inline]
    fn prepare(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn park(&self, token: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);

        if self.epoch.load(Ordering::SeqCst) != token {
            self.parked.fetch_sub(1, Ordering::SeqCst);
            return true;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Safety: valid futex word and timespec for the duration of the call.
        let result = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                token,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            )
        };

        self.parked.fetch_sub(1, Ordering::SeqCst);

        // 0 = FUTEX_WAKE or spurious; -1/EAGAIN = epoch moved before we slept;
        // -1/ETIMEDOUT, -1/EINTR = no wake.
        result == 0 || self.epoch.load(Ordering::SeqCst) != token
    }

    fn wake_one(&self) {
        self.wake(1);
    }

    fn wake_all(&self) {
        self.wake(i32::MAX);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
