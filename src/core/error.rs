//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::task::TaskState;
use crate::util::serde::{TaskId, TaskType};

/// Errors produced by the scheduler core and store backends.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No handler is registered for the task type.
    #[error("unknown task type: {0}")]
    UnknownTaskType(TaskType),
    /// The handler rejected the payload.
    #[error("payload validation failed for task type {0}")]
    ValidationFailed(TaskType),
    /// The requested execution time is not in the future.
    #[error("invalid schedule: {scheduled_for_ms} is not after {now_ms}")]
    InvalidSchedule {
        /// Requested execution time (ms since epoch).
        scheduled_for_ms: u128,
        /// Admission time (ms since epoch).
        now_ms: u128,
    },
    /// A record with the caller-supplied id already exists.
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(TaskId),
    /// No record exists for the id.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The record is COMPLETED, FAILED, or CANCELLED.
    #[error("task {id} is already terminal ({state})")]
    AlreadyTerminal {
        /// Task identifier.
        id: TaskId,
        /// Terminal state the record is in.
        state: TaskState,
    },
    /// Transient storage failure; never counted as a task attempt.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Configuration rejected during validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Whether the error comes from infrastructure rather than the request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Failure reported for a single execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("{0}")]
    Failed(String),
    /// The attempt exceeded its execution timeout (milliseconds).
    #[error("execution timed out after {0}ms")]
    TimedOut(u64),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Convenience constructor for handler-reported failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Reason string recorded as the task's `last_error`.
    #[must_use]
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
