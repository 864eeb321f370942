//! # handoff-runtime
//!
//! Execution contexts for handoff.
//!
//! This crate provides:
//! - `ThreadPool`: a bounded MPMC queue drained by N worker threads
//! - `run_loop` / `Workers`: starting and joining those workers
//! - Worker parking (futex on Linux, condvar elsewhere)
//! - Cooperative sessions: futures resumed inline by whoever wakes them

pub mod config;
pub mod parking;
pub mod pool;
pub mod worker;
pub mod session;

// Re-exports
pub use config::{ConfigError, PoolConfig};
pub use parking::{new_parking, WorkerParking};
pub use pool::{run_loop, PoolError, PoolStats, ThreadPool};
pub use session::SessionHandle;
pub use worker::{current_worker, Workers};
