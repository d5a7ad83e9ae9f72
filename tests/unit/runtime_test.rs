//! Tests for the tokio spawner and API helpers

use prometheus_delay_queue::core::{Spawn, TaskConfig, TaskRegistry, TaskScheduler, TaskState};
use prometheus_delay_queue::handlers::register_builtin_handlers;
use prometheus_delay_queue::infra::InMemoryTaskStore;
use prometheus_delay_queue::runtime::{
    cancel_from_request, schedule_from_request, status_from_request, ErrorResponse,
    ScheduleRequest, TokioSpawner,
};
use prometheus_delay_queue::util::{now_ms, TaskId};
use serde_json::json;

fn scheduler() -> TaskScheduler<InMemoryTaskStore> {
    let mut registry = TaskRegistry::new();
    register_builtin_handlers(&mut registry);
    TaskScheduler::new(InMemoryTaskStore::new(), registry)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::current().expect("inside a runtime");

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_tokio_spawner_outside_runtime() {
    assert!(TokioSpawner::current().is_err());
}

#[test]
fn test_schedule_request_accepts_job_style_body() {
    let scheduler = scheduler();
    let req: ScheduleRequest = serde_json::from_value(json!({
        "type": "email",
        "data": { "to": "a@example.com", "subject": "s", "content": "c" },
        "delay": 60_000,
        "config": { "attempts": 4, "jobId": "welcome-1", "backoff": { "type": "fixed", "delay": 10 } }
    }))
    .unwrap();

    let resp = schedule_from_request(&scheduler, req).unwrap();
    assert_eq!(resp.task_id, TaskId::new("welcome-1"));
    assert_eq!(resp.state, TaskState::Scheduled);
    assert_eq!(resp.max_attempts, 4);
    assert!(resp.scheduled_for_ms > now_ms());
}

#[test]
fn test_schedule_request_needs_exactly_one_time() {
    let scheduler = scheduler();
    let req = ScheduleRequest {
        task_type: "email".into(),
        payload: json!({ "to": "a@example.com", "subject": "s", "content": "c" }),
        scheduled_for_ms: None,
        delay_ms: None,
        config: TaskConfig::new(),
    };
    let err = schedule_from_request(&scheduler, req).unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.code, "invalid_request");
}

#[test]
fn test_errors_map_to_status_codes() {
    let scheduler = scheduler();

    let invalid = ScheduleRequest {
        task_type: "notification".into(),
        payload: json!({ "title": "t", "message": "m", "channel": "push" }),
        scheduled_for_ms: Some(now_ms() + 60_000),
        delay_ms: None,
        config: TaskConfig::new(),
    };
    assert_eq!(schedule_from_request(&scheduler, invalid).unwrap_err().status, 422);

    let missing = status_from_request(&scheduler, &TaskId::new("nope")).unwrap_err();
    assert_eq!(
        missing,
        ErrorResponse {
            status: 404,
            code: "not_found".into(),
            message: "task not found: nope".into(),
        }
    );
}

#[test]
fn test_cancel_then_cancel_again() {
    let scheduler = scheduler();
    let req = ScheduleRequest {
        task_type: "notification".into(),
        payload: json!({ "title": "t", "message": "m", "channel": "web" }),
        scheduled_for_ms: None,
        delay_ms: Some(60_000),
        config: TaskConfig::new(),
    };
    let id = schedule_from_request(&scheduler, req).unwrap().task_id;

    let status = cancel_from_request(&scheduler, &id).unwrap();
    assert_eq!(status.state, TaskState::Cancelled);
    assert_eq!(cancel_from_request(&scheduler, &id).unwrap_err().status, 409);
}
