//! Error types for submission and completion delivery

use crate::task::Task;
use std::fmt;
use thiserror::Error;

/// Result of one submission, as seen by whoever consumes the completion.
///
/// `Ok(())` means the task body ran to completion. Task-level failures are
/// the task's own business and never travel through this channel.
pub type Completion = Result<(), DispatchError>;

/// Why an executor refused a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The execution context was stopped
    #[error("executor stopped")]
    Stopped,

    /// The execution context has no room for more work
    #[error("executor saturated")]
    Saturated,
}

/// A refused submission.
///
/// The task is handed back untouched so the submitter decides what happens
/// to it. Dropping the task is allowed; running it elsewhere is allowed too.
pub struct Rejected {
    pub reason: RejectReason,
    pub task: Task,
}

impl Rejected {
    pub fn new(reason: RejectReason, task: Task) -> Self {
        Self { reason, task }
    }

    /// Reject the carried task and keep only the reason.
    pub fn into_reason(self) -> RejectReason {
        let reason = self.reason;
        self.task.reject(reason);
        reason
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task rejected: {}", self.reason)
    }
}

impl std::error::Error for Rejected {}

/// Failure delivered in place of a successful completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The executor refused the task; the body never ran
    #[error("submission rejected: {0}")]
    Rejected(RejectReason),

    /// The executor dropped the task without running or rejecting it
    #[error("task dropped by executor without running")]
    Abandoned,

    /// The task body panicked
    #[error("task panicked")]
    Panicked,

    /// The completion was already consumed by an earlier wait or poll
    #[error("completion already consumed")]
    Consumed,
}

impl From<RejectReason> for DispatchError {
    fn from(reason: RejectReason) -> Self {
        DispatchError::Rejected(reason)
    }
}

/// Misuse of a one-shot cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReuseViolation {
    /// A value was written a second time
    #[error("one-shot value written twice")]
    AlreadySet,

    /// The value was taken a second time
    #[error("one-shot value taken twice")]
    AlreadyTaken,
}
