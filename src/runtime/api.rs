//! API-facing request/response models.
//!
//! Transport-agnostic: an HTTP layer deserializes a request, calls one of the
//! helpers below and serializes whichever side of the `Result` comes back,
//! using [`ErrorResponse::status`] as the response code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{SchedulerError, TaskConfig, TaskRecord, TaskScheduler, TaskState, TaskStore};
use crate::util::serde::{TaskId, TaskType};

/// Request to schedule a task.
///
/// Exactly one of `scheduled_for_ms` and `delay_ms` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Handler selector.
    #[serde(alias = "type", alias = "taskType")]
    pub task_type: TaskType,
    /// Handler-defined data.
    #[serde(default, alias = "data")]
    pub payload: Value,
    /// Absolute execution time (ms since epoch).
    #[serde(default, alias = "scheduledFor", skip_serializing_if = "Option::is_none")]
    pub scheduled_for_ms: Option<u128>,
    /// Execution time relative to now, in milliseconds.
    #[serde(default, alias = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Per-task overrides.
    #[serde(default, alias = "options")]
    pub config: TaskConfig,
}

/// Response to a successful schedule request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTaskResponse {
    /// Assigned identifier.
    pub task_id: TaskId,
    /// Handler selector.
    pub task_type: TaskType,
    /// State after admission (always SCHEDULED).
    pub state: TaskState,
    /// Execution time (ms since epoch).
    pub scheduled_for_ms: u128,
    /// Attempt budget.
    pub max_attempts: u32,
}

/// Task status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    /// Task identifier.
    pub task_id: TaskId,
    /// Current state.
    pub state: TaskState,
    /// Attempts made.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Next eligible execution time (ms since epoch).
    pub scheduled_for_ms: u128,
    /// Reason of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<&TaskRecord> for TaskStatusResponse {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id.clone(),
            state: record.state,
            attempts: record.attempts,
            max_attempts: record.max_attempts,
            scheduled_for_ms: record.scheduled_for_ms,
            last_error: record.last_error.clone(),
        }
    }
}

/// Error body with an HTTP-style status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code.
    pub status: u16,
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorResponse {
    fn new(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&SchedulerError> for ErrorResponse {
    fn from(err: &SchedulerError) -> Self {
        let (status, code) = match err {
            SchedulerError::UnknownTaskType(_) => (400, "unknown_task_type"),
            SchedulerError::ValidationFailed(_) => (422, "validation_failed"),
            SchedulerError::InvalidSchedule { .. } => (400, "invalid_schedule"),
            SchedulerError::DuplicateTaskId(_) => (409, "duplicate_task_id"),
            SchedulerError::NotFound(_) => (404, "not_found"),
            SchedulerError::AlreadyTerminal { .. } => (409, "already_terminal"),
            SchedulerError::StoreUnavailable(_) => (503, "store_unavailable"),
            SchedulerError::InvalidConfig(_) => (500, "invalid_config"),
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<SchedulerError> for ErrorResponse {
    fn from(err: SchedulerError) -> Self {
        Self::from(&err)
    }
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Stored records, terminal ones included.
    pub tasks: usize,
}

/// Schedule a task from an API request.
///
/// # Errors
///
/// `400` when the request sets both or neither of `scheduled_for_ms` and
/// `delay_ms`; otherwise the mapped admission error.
pub fn schedule_from_request<S>(
    scheduler: &TaskScheduler<S>,
    req: ScheduleRequest,
) -> Result<ScheduledTaskResponse, ErrorResponse>
where
    S: TaskStore,
{
    let scheduled_for_ms = match (req.scheduled_for_ms, req.delay_ms) {
        (Some(at), None) => at,
        (None, Some(delay)) => scheduler.now_ms().saturating_add(u128::from(delay)),
        _ => {
            return Err(ErrorResponse::new(
                400,
                "invalid_request",
                "exactly one of scheduled_for_ms and delay_ms is required",
            ))
        }
    };

    let record = scheduler.schedule_task(req.task_type, req.payload, scheduled_for_ms, req.config)?;
    Ok(ScheduledTaskResponse {
        task_id: record.id,
        task_type: record.task_type,
        state: record.state,
        scheduled_for_ms: record.scheduled_for_ms,
        max_attempts: record.max_attempts,
    })
}

/// Cancel a task and return its resulting status.
///
/// # Errors
///
/// `404` for an unknown id, `409` for a task that already finished.
pub fn cancel_from_request<S>(
    scheduler: &TaskScheduler<S>,
    id: &TaskId,
) -> Result<TaskStatusResponse, ErrorResponse>
where
    S: TaskStore,
{
    scheduler.cancel_task(id)?;
    status_from_request(scheduler, id)
}

/// Current status of a task.
///
/// # Errors
///
/// `404` for an unknown id.
pub fn status_from_request<S>(
    scheduler: &TaskScheduler<S>,
    id: &TaskId,
) -> Result<TaskStatusResponse, ErrorResponse>
where
    S: TaskStore,
{
    let record = scheduler.get_task(id)?;
    Ok(TaskStatusResponse::from(&record))
}

/// Return a health payload.
pub fn health<S>(scheduler: &TaskScheduler<S>) -> Health
where
    S: TaskStore,
{
    Health {
        ok: true,
        tasks: scheduler.len(),
    }
}
