//! Tests for error types

use prometheus_delay_queue::core::{HandlerError, SchedulerError, TaskState};
use prometheus_delay_queue::util::serde::{TaskId, TaskType};

#[test]
fn test_unknown_task_type_error() {
    let err = SchedulerError::UnknownTaskType(TaskType::new("sms"));
    assert_eq!(format!("{err}"), "unknown task type: sms");
}

#[test]
fn test_already_terminal_error() {
    let err = SchedulerError::AlreadyTerminal {
        id: TaskId::new("t-9"),
        state: TaskState::Completed,
    };
    assert_eq!(format!("{err}"), "task t-9 is already terminal (completed)");
}

#[test]
fn test_only_store_errors_are_transient() {
    assert!(SchedulerError::StoreUnavailable("disk full".into()).is_transient());
    assert!(!SchedulerError::NotFound(TaskId::new("x")).is_transient());
    assert!(!SchedulerError::ValidationFailed(TaskType::email()).is_transient());
}

#[test]
fn test_handler_error_reasons() {
    assert_eq!(HandlerError::failed("smtp down").reason(), "smtp down");
    assert_eq!(
        HandlerError::TimedOut(1500).reason(),
        "execution timed out after 1500ms"
    );
    assert_eq!(
        HandlerError::Panicked("index out of bounds".into()).reason(),
        "handler panicked: index out of bounds"
    );
}
