//! Benchmark knobs
//!
//! Every field can be overridden from the environment:
//!
//! | Variable                        | Default             |
//! |---------------------------------|---------------------|
//! | `BENCH_NUM_THREADS`             | CPUs                |
//! | `BENCH_NUM_SESSIONS`            | 1600 × CPUs         |
//! | `BENCH_DISPATCHES_PER_SESSION`  | 10                  |
//! | `BENCH_NUM_BUFFERS`             | 1000                |
//! | `BENCH_BUFFER_SIZE`             | 4096                |
//! | `BENCH_CHARS_BETWEEN_WAIT`      | 3 × buffer size     |
//! | `BENCH_WAIT_MS`                 | 1                   |

use handoff::env::{env_get, env_get_ms};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Pool workers, and driver threads for the blocking approach
    pub num_threads: usize,
    /// Independent chains of dependent dispatches
    pub num_sessions: usize,
    pub dispatches_per_session: usize,
    /// Buffers kept in the shared pool
    pub num_buffers: usize,
    pub buffer_size: usize,
    /// Characters processed between two simulated I/O waits
    pub num_chars_between_wait: u64,
    /// Length of one simulated I/O wait
    pub wait_time: Duration,
}

impl BenchConfig {
    pub fn from_env() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let buffer_size = env_get("BENCH_BUFFER_SIZE", 4096usize).max(1);

        Self {
            num_threads: env_get("BENCH_NUM_THREADS", cpus).max(1),
            num_sessions: env_get("BENCH_NUM_SESSIONS", 1600 * cpus).max(1),
            dispatches_per_session: env_get("BENCH_DISPATCHES_PER_SESSION", 10),
            num_buffers: env_get("BENCH_NUM_BUFFERS", 1000),
            buffer_size,
            num_chars_between_wait: env_get(
                "BENCH_CHARS_BETWEEN_WAIT",
                3 * buffer_size as u64,
            ),
            wait_time: env_get_ms("BENCH_WAIT_MS", Duration::from_millis(1)),
        }
    }

    /// Total dispatches one approach performs.
    pub fn total_dispatches(&self) -> u64 {
        self.num_sessions as u64 * self.dispatches_per_session as u64
    }
}
