//! Tests for configuration validation

use std::collections::HashMap;
use std::path::PathBuf;

use prometheus_delay_queue::config::{SchedulerConfig, StoreBackendConfig};
use prometheus_delay_queue::core::BackoffPolicy;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.concurrency, 5);
    assert_eq!(cfg.default_max_attempts, 3);
    assert_eq!(cfg.default_backoff, BackoffPolicy::default());
    assert_eq!(cfg.store, StoreBackendConfig::InMemory);
}

#[test]
fn test_zero_concurrency_rejected() {
    let cfg = SchedulerConfig {
        concurrency: 0,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_timeout_must_fit_inside_claim_grace() {
    let cfg = SchedulerConfig {
        default_timeout_ms: Some(600_000),
        claim_grace_ms: 300_000,
        ..SchedulerConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("claim_grace_ms"));
}

#[test]
fn test_from_json_str_partial_document() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "concurrency": 2,
            "default_backoff": { "type": "fixed", "delay": 250 },
            "store": { "type": "file", "path": "/var/lib/delay-queue" }
        }"#,
    )
    .unwrap();

    assert_eq!(cfg.concurrency, 2);
    assert_eq!(cfg.poll_interval_ms, 1_000);
    assert_eq!(cfg.default_backoff, BackoffPolicy::Fixed { delay_ms: 250 });
    assert_eq!(
        cfg.store,
        StoreBackendConfig::File {
            path: PathBuf::from("/var/lib/delay-queue"),
            stream: "tasks".into(),
        }
    );
}

#[test]
fn test_from_json_str_rejects_bad_input() {
    assert!(SchedulerConfig::from_json_str("not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{"poll_interval_ms": 0}"#).is_err());
}

#[test]
fn test_from_lookup_reads_prefixed_variables() {
    let cfg = SchedulerConfig::from_lookup(lookup(&[
        ("DELAY_QUEUE_CONCURRENCY", "8"),
        ("DELAY_QUEUE_MAX_ATTEMPTS", "5"),
        ("DELAY_QUEUE_BACKOFF_TYPE", "fixed"),
        ("DELAY_QUEUE_BACKOFF_DELAY_MS", "2000"),
        ("DELAY_QUEUE_RETENTION_MS", "86400000"),
        ("DELAY_QUEUE_STORE", "file"),
        ("DELAY_QUEUE_STORE_PATH", "/tmp/dq"),
        ("DELAY_QUEUE_STREAM", "jobs"),
    ]))
    .unwrap();

    assert_eq!(cfg.concurrency, 8);
    assert_eq!(cfg.default_max_attempts, 5);
    assert_eq!(cfg.default_backoff, BackoffPolicy::Fixed { delay_ms: 2_000 });
    assert_eq!(cfg.retention_ms, Some(86_400_000));
    assert_eq!(
        cfg.store,
        StoreBackendConfig::File {
            path: PathBuf::from("/tmp/dq"),
            stream: "jobs".into(),
        }
    );
}

#[test]
fn test_from_lookup_errors_name_the_variable() {
    let err = SchedulerConfig::from_lookup(lookup(&[("DELAY_QUEUE_CONCURRENCY", "many")]))
        .unwrap_err();
    assert!(err.starts_with("DELAY_QUEUE_CONCURRENCY"));

    let err = SchedulerConfig::from_lookup(lookup(&[("DELAY_QUEUE_STORE", "file")])).unwrap_err();
    assert!(err.contains("STORE_PATH"));

    let err =
        SchedulerConfig::from_lookup(lookup(&[("DELAY_QUEUE_BACKOFF_TYPE", "linear")])).unwrap_err();
    assert!(err.contains("linear"));
}

#[test]
fn test_from_lookup_without_variables_is_default() {
    let cfg = SchedulerConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, SchedulerConfig::default());
}
