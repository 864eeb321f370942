//! # handoff
//!
//! Post a task to an executor and hear back when it is done, in whichever
//! style the caller is written in:
//!
//! ```text
//!   dispatch(&pool, task, Blocking)        -> Result<(), DispatchError>
//!   dispatch(&pool, task, callback(f))     -> ()        f(completion) later
//!   dispatch(&pool, task, Suspend).await   -> Result<(), DispatchError>
//!   dispatch_lazy(&pool, task).await       -> same, submitted on first poll
//! ```
//!
//! Any [`Executor`] works. [`ThreadPool`] is the one shipped here; inside a
//! [`session`] a `Suspend` dispatch resumes on the worker that ran the task.
//!
//! ## Example
//!
//! ```no_run
//! use handoff::{dispatch, Blocking, PoolConfig, ThreadPool};
//!
//! let pool = ThreadPool::new(PoolConfig::new().num_workers(4)).unwrap();
//! let _workers = pool.start().unwrap();
//!
//! dispatch(&*pool, || println!("on a worker"), Blocking).unwrap();
//! ```

pub mod dispatch;
pub mod token;

pub use dispatch::{dispatch, dispatch_lazy, ExecutorExt};
pub use token::{
    callback, Blocking, Callback, CompletionToken, LazySuspended, Notify, Suspend, SuspendSlot,
    Suspended,
};

pub use handoff_core::env;
pub use handoff_core::{
    Completion, DispatchError, Executor, Job, Latch, OneShot, RejectReason, Rejected,
    ReuseViolation, Task,
};
pub use handoff_runtime::{
    current_worker, run_loop, session, ConfigError, PoolConfig, PoolError, PoolStats,
    SessionHandle, ThreadPool, Workers,
};
