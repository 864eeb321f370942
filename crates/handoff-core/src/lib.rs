//! # handoff-core
//!
//! Core types and traits shared by the handoff executor and completion
//! bridge.
//!
//! This crate knows nothing about thread pools or completion tokens. It defines the
//! boundary between "something that runs tasks" and "something that wants
//! to hear back", plus the one-shot cells both sides meet in.
//!
//! ## Modules
//!
//! - `task` - Type-erased unit of work (`Task`, `Job`)
//! - `executor` - The `Executor` trait (submit one task)
//! - `error` - Rejection and completion errors
//! - `once` - Write-once / take-once cell
//! - `latch` - Park/wake latch for blocking consumers
//! - `env` - Environment variable helpers for config structs

pub mod task;
pub mod executor;
pub mod error;
pub mod once;
pub mod latch;
pub mod env;

// Re-exports for convenience
pub use task::{Job, Task};
pub use executor::Executor;
pub use error::{Completion, DispatchError, RejectReason, Rejected, ReuseViolation};
pub use once::OneShot;
pub use latch::Latch;
pub use env::{env_get, env_get_ms, env_get_opt};
