//! Tests for task store backends through the `TaskStore` trait

use prometheus_delay_queue::core::{
    BackoffPolicy, DynTaskStore, SchedulerError, TaskRecord, TaskState, TaskStore,
};
use prometheus_delay_queue::infra::{FileTaskStore, InMemoryTaskStore};
use prometheus_delay_queue::util::{TaskId, TaskType};
use serde_json::json;

fn record(id: &str, due: u128, priority: i32) -> TaskRecord {
    TaskRecord {
        id: TaskId::new(id),
        task_type: TaskType::email(),
        payload: json!({ "n": id }),
        scheduled_for_ms: due,
        state: TaskState::Scheduled,
        attempts: 0,
        max_attempts: 3,
        backoff: BackoffPolicy::default(),
        priority,
        timeout_ms: None,
        last_error: None,
        created_at_ms: 0,
        updated_at_ms: 0,
        claimed_at_ms: None,
        revision: 0,
    }
}

fn temp_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("delay-queue-unit-{}", TaskId::generate()))
}

fn exercise(store: &mut DynTaskStore) {
    store.insert(record("late", 300, 0)).unwrap();
    store.insert(record("low", 100, 1)).unwrap();
    store.insert(record("high", 100, 9)).unwrap();
    assert!(matches!(
        store.insert(record("low", 5, 0)),
        Err(SchedulerError::DuplicateTaskId(_))
    ));

    let ids: Vec<String> = store
        .ready(200, 10)
        .unwrap()
        .into_iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["high", "low"]);
    assert_eq!(store.next_due_ms().unwrap(), Some(100));

    let mut active = store.get(&TaskId::new("high")).unwrap().unwrap();
    active.state = TaskState::Active;
    active.attempts = 1;
    active.claimed_at_ms = Some(150);
    active.revision = 1;
    assert!(store.compare_and_set(TaskState::Scheduled, 0, active.clone()).unwrap());
    assert!(!store.compare_and_set(TaskState::Scheduled, 0, active).unwrap());

    assert_eq!(store.stale_active(200).unwrap().len(), 1);
    assert!(store.stale_active(100).unwrap().is_empty());
    assert_eq!(store.len(), 3);
}

#[test]
fn test_in_memory_store_contract() {
    let mut store: DynTaskStore = Box::new(InMemoryTaskStore::new());
    exercise(&mut store);
}

#[test]
fn test_file_store_contract() {
    let dir = temp_dir();
    let mut store: DynTaskStore = Box::new(FileTaskStore::open(&dir, "unit").unwrap());
    exercise(&mut store);
    drop(store);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_file_store_reopen_keeps_latest_version() {
    let dir = temp_dir();
    {
        let mut store = FileTaskStore::open(&dir, "unit").unwrap();
        store.insert(record("a", 100, 0)).unwrap();
        let mut delayed = record("a", 900, 0);
        delayed.state = TaskState::Delayed;
        delayed.attempts = 1;
        delayed.revision = 1;
        assert!(store.compare_and_set(TaskState::Scheduled, 0, delayed).unwrap());
    }

    let store = FileTaskStore::open(&dir, "unit").unwrap();
    let a = store.get(&TaskId::new("a")).unwrap().unwrap();
    assert_eq!(a.state, TaskState::Delayed);
    assert_eq!(a.scheduled_for_ms, 900);
    assert_eq!(a.attempts, 1);
    assert!(store.ready(899, 10).unwrap().is_empty());
    assert_eq!(store.ready(900, 10).unwrap().len(), 1);
    drop(store);
    let _ = std::fs::remove_dir_all(dir);
}
