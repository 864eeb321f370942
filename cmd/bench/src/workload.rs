//! The unit of work every approach dispatches
//!
//! Borrow a buffer from a shared pool, fill it, count its characters and
//! give it back. Every `num_chars_between_wait` characters (summed over all
//! tasks) the task that crosses the boundary sleeps `wait_time`, standing in
//! for an I/O wait.

use crate::config::BenchConfig;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Fixed set of reusable buffers
///
/// An empty pool hands out a fresh buffer instead of blocking; a full pool
/// drops what is returned to it.
pub struct BufferPool {
    free: ArrayQueue<Vec<u8>>,
    buffer_size: usize,
}

impl BufferPool {
    pub fn new(num_buffers: usize, buffer_size: usize) -> Self {
        let free = ArrayQueue::new(num_buffers.max(1));
        for _ in 0..num_buffers {
            let _ = free.push(vec![0u8; buffer_size]);
        }
        Self { free, buffer_size }
    }

    pub fn take(&self) -> Vec<u8> {
        self.free
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size])
    }

    pub fn put(&self, buf: Vec<u8>) {
        let _ = self.free.push(buf);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

pub struct Workload {
    buffers: BufferPool,
    chars: AtomicU64,
    waits: AtomicU64,
    between_wait: u64,
    wait_time: Duration,
}

impl Workload {
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            buffers: BufferPool::new(config.num_buffers, config.buffer_size),
            chars: AtomicU64::new(0),
            waits: AtomicU64::new(0),
            between_wait: config.num_chars_between_wait,
            wait_time: config.wait_time,
        }
    }

    /// One task body.
    pub fn run_once(&self, seed: u64) {
        let mut buf = self.buffers.take();
        let count = fill_and_count(&mut buf, seed);
        self.buffers.put(buf);

        let before = self.chars.fetch_add(count, Ordering::Relaxed);
        let every = self.between_wait;
        if every > 0 && (before + count) / every > before / every {
            self.waits.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(self.wait_time);
        }
    }

    pub fn chars(&self) -> u64 {
        self.chars.load(Ordering::Relaxed)
    }

    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

/// Fill `buf` with printable text derived from `seed`; count the letters.
fn fill_and_count(buf: &mut [u8], seed: u64) -> u64 {
    let mut state = seed | 1;
    let mut letters = 0;
    for byte in buf.iter_mut() {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *byte = b' ' + (state % 95) as u8;
        if byte.is_ascii_alphabetic() {
            letters += 1;
        }
    }
    letters
}
