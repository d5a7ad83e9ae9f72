//! Tests for backoff policies

use std::time::Duration;

use prometheus_delay_queue::core::BackoffPolicy;

const CAP: u64 = 3_600_000;

#[test]
fn test_exponential_doubles_per_attempt() {
    let policy = BackoffPolicy::exponential(Duration::from_secs(1));
    let delays: Vec<u64> = (1..=4).map(|n| policy.delay_ms(n, CAP)).collect();
    assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
}

#[test]
fn test_fixed_is_constant() {
    let policy = BackoffPolicy::fixed(Duration::from_millis(250));
    assert!((1..10).all(|n| policy.delay_ms(n, CAP) == 250));
}

#[test]
fn test_delays_never_decrease_and_respect_cap() {
    let policy = BackoffPolicy::exponential(Duration::from_millis(700));
    let mut previous = 0;
    for attempts in 1..200 {
        let delay = policy.delay_ms(attempts, CAP);
        assert!(delay >= previous, "attempt {attempts} went backwards");
        assert!(delay <= CAP);
        previous = delay;
    }
    assert_eq!(previous, CAP);
}

#[test]
fn test_wire_format_matches_job_options() {
    let policy: BackoffPolicy =
        serde_json::from_str(r#"{"type":"exponential","delay":1000}"#).unwrap();
    assert_eq!(policy, BackoffPolicy::default());

    let fixed = serde_json::to_value(BackoffPolicy::fixed(Duration::from_secs(5))).unwrap();
    assert_eq!(fixed, serde_json::json!({ "type": "fixed", "delay": 5000 }));
}
