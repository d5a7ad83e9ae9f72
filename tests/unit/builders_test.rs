//! Tests for builder modules

use std::time::Duration;

use prometheus_delay_queue::builders::{dispatcher_config, scheduler_settings, SchedulerBuilder};
use prometheus_delay_queue::config::{SchedulerConfig, StoreBackendConfig};
use prometheus_delay_queue::core::{SchedulerError, TaskConfig, TaskState};
use prometheus_delay_queue::util::{now_ms, TaskType};
use serde_json::json;

#[test]
fn test_config_maps_to_components() {
    let cfg = SchedulerConfig {
        concurrency: 7,
        poll_interval_ms: 250,
        retention_ms: Some(60_000),
        default_timeout_ms: Some(5_000),
        ..SchedulerConfig::default()
    };

    let dispatcher = dispatcher_config(&cfg);
    assert_eq!(dispatcher.concurrency, 7);
    assert_eq!(dispatcher.poll_interval, Duration::from_millis(250));
    assert_eq!(dispatcher.retention, Some(Duration::from_secs(60)));

    let settings = scheduler_settings(&cfg);
    assert_eq!(settings.default_max_attempts, 3);
    assert_eq!(settings.default_timeout_ms, Some(5_000));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let cfg = SchedulerConfig {
        default_max_attempts: 0,
        ..SchedulerConfig::default()
    };
    let err = SchedulerBuilder::new(cfg).build().unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

#[test]
fn test_builder_with_builtin_handlers() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig::default())
        .with_builtin_handlers()
        .build()
        .unwrap();

    assert_eq!(
        scheduler.registry().task_types(),
        vec![TaskType::email(), TaskType::notification()]
    );
    let record = scheduler
        .schedule_task(
            "notification",
            json!({ "title": "t", "message": "m", "channel": "in-app" }),
            now_ms() + 60_000,
            TaskConfig::new(),
        )
        .unwrap();
    assert_eq!(scheduler.get_status(&record.id).unwrap(), TaskState::Scheduled);
}

#[test]
fn test_builder_opens_file_store() {
    let dir = std::env::temp_dir().join(format!("delay-queue-builder-{}", now_ms()));
    let cfg = SchedulerConfig {
        store: StoreBackendConfig::File {
            path: dir.clone(),
            stream: "builder".into(),
        },
        ..SchedulerConfig::default()
    };
    let scheduler = SchedulerBuilder::new(cfg).with_builtin_handlers().build().unwrap();
    assert!(scheduler.is_empty());
    assert!(dir.join("builder.jsonl").exists());
    drop(scheduler);
    let _ = std::fs::remove_dir_all(dir);
}
