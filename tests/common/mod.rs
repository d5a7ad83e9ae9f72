//! Shared handlers and helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use prometheus_delay_queue::config::SchedulerConfig;
use prometheus_delay_queue::core::{
    ExecutionContext, HandlerError, SchedulerError, TaskHandler, TaskRecord, TaskScheduler,
    TaskState, TaskStore,
};
use prometheus_delay_queue::infra::store::InMemoryTaskStore;
use prometheus_delay_queue::util::{now_ms, TaskId};

/// Config tuned for fast tests: short polling, no timeouts.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval_ms: 20,
        reconcile_interval_ms: 60_000,
        ..SchedulerConfig::default()
    }
}

/// Wait until the task reaches `state`, panicking after `limit`.
pub async fn wait_for_state<S: TaskStore>(
    scheduler: &TaskScheduler<S>,
    id: &TaskId,
    state: TaskState,
    limit: Duration,
) {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let current = scheduler.get_status(id).expect("task exists");
        if current == state {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} stuck in {current}, expected {state}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Records every execution: task id, attempt and wall-clock time.
#[derive(Clone, Default)]
pub struct Recorder {
    pub runs: Arc<Mutex<Vec<(TaskId, u32, u128)>>>,
}

impl Recorder {
    pub fn ids(&self) -> Vec<TaskId> {
        self.runs.lock().iter().map(|(id, _, _)| id.clone()).collect()
    }

    pub fn count_by_id(&self) -> HashMap<TaskId, usize> {
        let mut counts = HashMap::new();
        for (id, _, _) in self.runs.lock().iter() {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl TaskHandler for Recorder {
    fn validate(&self, _payload: &Value) -> bool {
        true
    }

    async fn execute(&self, _payload: Value, ctx: ExecutionContext) -> Result<(), HandlerError> {
        self.runs.lock().push((ctx.task_id, ctx.attempt, now_ms()));
        Ok(())
    }
}

/// Fails until `succeed_on` attempt (0 = never succeeds).
pub struct Flaky {
    pub succeed_on: u32,
    pub calls: Arc<AtomicUsize>,
    pub ran_at: Arc<Mutex<Vec<u128>>>,
}

#[async_trait]
impl TaskHandler for Flaky {
    fn validate(&self, _payload: &Value) -> bool {
        true
    }

    async fn execute(&self, _payload: Value, ctx: ExecutionContext) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ran_at.lock().push(now_ms());
        if self.succeed_on != 0 && ctx.attempt >= self.succeed_on {
            Ok(())
        } else {
            Err(HandlerError::failed(format!("attempt {} failed", ctx.attempt)))
        }
    }
}

/// Sleeps for `work`, tracking how many executions overlap.
#[derive(Clone)]
pub struct Sleeper {
    pub work: Duration,
    pub running: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
}

impl Sleeper {
    pub fn new(work: Duration) -> Self {
        Self {
            work,
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl TaskHandler for Sleeper {
    fn validate(&self, _payload: &Value) -> bool {
        true
    }

    async fn execute(&self, _payload: Value, _ctx: ExecutionContext) -> Result<(), HandlerError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.work).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Panics on every attempt.
pub struct Panicky;

#[async_trait]
impl TaskHandler for Panicky {
    fn validate(&self, _payload: &Value) -> bool {
        true
    }

    async fn execute(&self, _payload: Value, _ctx: ExecutionContext) -> Result<(), HandlerError> {
        panic!("handler exploded");
    }
}

/// Switches shared between a test and a [`FaultyStore`].
#[derive(Clone, Default)]
pub struct StoreFaults {
    pub ready: Arc<AtomicBool>,
    pub writes: Arc<AtomicBool>,
    pub rejected: Arc<AtomicUsize>,
}

impl StoreFaults {
    pub fn fail_ready(&self, on: bool) {
        self.ready.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.writes.store(on, Ordering::SeqCst);
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    fn check(&self, switch: &AtomicBool, op: &str) -> Result<(), SchedulerError> {
        if switch.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(SchedulerError::StoreUnavailable(format!("{op}: connection refused")));
        }
        Ok(())
    }
}

/// In-memory store whose readiness query and writes can be switched off.
pub struct FaultyStore {
    inner: InMemoryTaskStore,
    faults: StoreFaults,
}

impl FaultyStore {
    pub fn new(faults: StoreFaults) -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            faults,
        }
    }
}

impl TaskStore for FaultyStore {
    fn insert(&mut self, record: TaskRecord) -> Result<(), SchedulerError> {
        self.inner.insert(record)
    }

    fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, SchedulerError> {
        self.inner.get(id)
    }

    fn ready(&self, now_ms: u128, limit: usize) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.faults.check(&self.faults.ready, "ready")?;
        self.inner.ready(now_ms, limit)
    }

    fn compare_and_set(
        &mut self,
        expected: TaskState,
        expected_revision: u64,
        record: TaskRecord,
    ) -> Result<bool, SchedulerError> {
        self.faults.check(&self.faults.writes, "compare_and_set")?;
        self.inner.compare_and_set(expected, expected_revision, record)
    }

    fn next_due_ms(&self) -> Result<Option<u128>, SchedulerError> {
        self.inner.next_due_ms()
    }

    fn stale_active(&self, claimed_before_ms: u128) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.inner.stale_active(claimed_before_ms)
    }

    fn prune_terminal(&mut self, updated_before_ms: u128) -> Result<usize, SchedulerError> {
        self.inner.prune_terminal(updated_before_ms)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Succeeds, but cuts off store writes while its first attempt runs.
pub struct OutageOnFirstRun {
    pub faults: StoreFaults,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for OutageOnFirstRun {
    fn validate(&self, _payload: &Value) -> bool {
        true
    }

    async fn execute(&self, _payload: Value, ctx: ExecutionContext) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ctx.attempt == 1 {
            self.faults.fail_writes(true);
        }
        Ok(())
    }
}
