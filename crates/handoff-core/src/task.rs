//! Type-erased unit of work
//!
//! A `Task` is what executors queue. It is consumed by `run()`, so an
//! executor cannot run the same task twice without going through `unsafe`.

use crate::error::RejectReason;
use std::fmt;

/// Work that can be boxed into a [`Task`].
///
/// Plain closures go through [`Task::new`]. Implement `Job` directly when the
/// producer needs to observe a rejection (the completion bridge does).
pub trait Job: Send + 'static {
    /// Run the work. Called at most once.
    fn run(self: Box<Self>);

    /// The executor refused the job. The body must not run.
    ///
    /// Default: drop the job.
    fn reject(self: Box<Self>, reason: RejectReason) {
        let _ = reason;
    }
}

struct Closure<F>(F);

impl<F> Job for Closure<F>
where
    F: FnOnce() + Send + 'static,
{
    #[inline]
    fn run(self: Box<Self>) {
        (self.0)()
    }
}

/// An owned, `Send` unit of work with no return value
pub struct Task {
    job: Box<dyn Job>,
}

impl Task {
    /// Box a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            job: Box::new(Closure(f)),
        }
    }

    /// Box a custom job.
    pub fn from_job<J: Job>(job: J) -> Self {
        Self { job: Box::new(job) }
    }

    /// Execute the task on the current thread.
    #[inline]
    pub fn run(self) {
        self.job.run()
    }

    /// Report a refused submission to the task's producer without running it.
    pub fn reject(self, reason: RejectReason) {
        self.job.reject(reason)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task { .. }")
    }
}
