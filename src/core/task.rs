//! Task records and their lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::retry::BackoffPolicy;
use crate::util::serde::{TaskId, TaskType};

/// Lifecycle state of a task record.
///
/// ```text
/// SCHEDULED -> ACTIVE -> COMPLETED | DELAYED | FAILED
/// DELAYED   -> ACTIVE
/// any non-terminal -> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Admitted and waiting for its due time.
    Scheduled,
    /// Waiting for a retry after a failed attempt.
    Delayed,
    /// Claimed by a dispatcher and executing.
    Active,
    /// Finished successfully.
    Completed,
    /// Exhausted its attempts.
    Failed,
    /// Cancelled by request.
    Cancelled,
}

impl TaskState {
    /// Terminal states have no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States the readiness query returns once due.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Scheduled | Self::Delayed)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task overrides supplied at admission.
///
/// Field aliases accept the camelCase job options used by existing clients
/// (`attempts`, `jobId`, `timeout`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum execution attempts, including the first.
    #[serde(alias = "attempts", skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Retry backoff policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffPolicy>,
    /// Ordering hint among tasks due at the same instant; higher runs first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Caller-chosen identifier.
    #[serde(alias = "jobId", skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    /// Execution timeout per attempt, in milliseconds.
    #[serde(alias = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl TaskConfig {
    /// Empty configuration (all defaults).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Override the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Use a caller-chosen id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the per-attempt execution timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Persisted unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier, immutable.
    pub id: TaskId,
    /// Handler selector, immutable.
    pub task_type: TaskType,
    /// Handler-defined data, never mutated by the scheduler.
    pub payload: serde_json::Value,
    /// Next eligible execution time (ms since epoch).
    pub scheduled_for_ms: u128,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Attempts made so far.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Retry backoff policy.
    pub backoff: BackoffPolicy,
    /// Ordering hint among equally due tasks; higher first.
    pub priority: i32,
    /// Per-attempt execution timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Reason of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Admission time (ms since epoch).
    pub created_at_ms: u128,
    /// Time of the last state change (ms since epoch).
    pub updated_at_ms: u128,
    /// Time the current claim was taken, while ACTIVE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at_ms: Option<u128>,
    /// Write counter used by the store's compare-and-set.
    #[serde(default)]
    pub revision: u64,
}

impl TaskRecord {
    /// Whether the record can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the record is waiting to be dispatched and due at `now_ms`.
    #[must_use]
    pub const fn is_due(&self, now_ms: u128) -> bool {
        self.state.is_pending() && self.scheduled_for_ms <= now_ms
    }

    /// Whether another attempt is allowed after the current one fails.
    #[must_use]
    pub const fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
