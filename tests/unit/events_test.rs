//! Tests for lifecycle event publication

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_delay_queue::core::{build_event, EventKind, EventNotifier, InMemoryEventLog};
use prometheus_delay_queue::util::{TaskId, TaskType};

#[test]
fn test_event_kind_wire_names() {
    let names: Vec<String> = [
        EventKind::Scheduled,
        EventKind::Active,
        EventKind::Completed,
        EventKind::Delayed,
        EventKind::Failed,
        EventKind::Cancelled,
    ]
    .iter()
    .map(|k| serde_json::to_value(k).unwrap().as_str().unwrap().to_string())
    .collect();
    assert_eq!(
        names,
        vec!["scheduled", "active", "completed", "delayed", "failed", "cancelled"]
    );
}

#[test]
fn test_event_log_filters() {
    let notifier = EventNotifier::new();
    let log = InMemoryEventLog::new(16);
    log.attach(&notifier);

    let a = TaskId::new("a");
    let b = TaskId::new("b");
    notifier.publish(build_event(&a, &TaskType::email(), EventKind::Scheduled, None));
    notifier.publish(build_event(&b, &TaskType::email(), EventKind::Scheduled, None));
    notifier.publish(build_event(
        &a,
        &TaskType::email(),
        EventKind::Failed,
        Some("smtp down".into()),
    ));

    assert_eq!(log.kinds_for(&a), vec![EventKind::Scheduled, EventKind::Failed]);
    let failed = log.of_kind(EventKind::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].detail.as_deref(), Some("smtp down"));
}

#[test]
fn test_unsubscribed_callback_not_called() {
    let notifier = EventNotifier::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let id = notifier.subscribe(EventKind::Completed, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    let event = build_event(&TaskId::new("x"), &TaskType::notification(), EventKind::Completed, None);
    notifier.publish(event.clone());
    notifier.unsubscribe(id);
    notifier.publish(event);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
