//! Tests for utility functions

use std::time::Duration;

use prometheus_delay_queue::util::{now_ms, Clock, ManualClock, SystemClock, TaskId, TaskType};

#[test]
fn test_manual_clock_clones_share_time() {
    let clock = ManualClock::new(1_000);
    let other = clock.clone();
    clock.advance(Duration::from_millis(250));
    assert_eq!(other.now_ms(), 1_250);
    other.set(5);
    assert_eq!(clock.now_ms(), 5);
}

#[test]
fn test_system_clock_tracks_wall_clock() {
    let before = now_ms();
    let observed = SystemClock.now_ms();
    assert!(observed >= before);
}

#[test]
fn test_task_id_conversions() {
    let id: TaskId = "job-1".into();
    assert_eq!(id.as_str(), "job-1");
    assert_eq!(id.to_string(), "job-1");
    assert_eq!(TaskId::from(String::from("job-1")), id);
}

#[test]
fn test_builtin_task_types() {
    assert_eq!(TaskType::email().as_str(), TaskType::EMAIL);
    assert_eq!(TaskType::notification().as_str(), "notification");
    assert_eq!(TaskType::from("email"), TaskType::email());
}
