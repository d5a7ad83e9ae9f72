//! Scheduler core: admission, cancellation, status and outcome handling.
//!
//! Every state change goes through the store's compare-and-set, so the
//! scheduler can be shared between admission callers and any number of
//! dispatchers without further locking.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::core::error::{HandlerError, SchedulerError};
use crate::core::events::{EventKind, EventNotifier, LifecycleEvent};
use crate::core::registry::{ExecutionContext, TaskHandler, TaskRegistry};
use crate::core::retry::BackoffPolicy;
use crate::core::store::TaskStore;
use crate::core::task::{TaskConfig, TaskRecord, TaskState};
use crate::util::clock::{Clock, SystemClock};
use crate::util::serde::{TaskId, TaskType};

/// Defaults applied to tasks that do not override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Attempt budget when the task config sets none.
    pub default_max_attempts: u32,
    /// Backoff policy when the task config sets none.
    pub default_backoff: BackoffPolicy,
    /// Upper bound for any computed retry delay.
    pub max_backoff_ms: u64,
    /// Per-attempt timeout when the task config sets none.
    pub default_timeout_ms: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            default_backoff: BackoffPolicy::default(),
            max_backoff_ms: 3_600_000,
            default_timeout_ms: None,
        }
    }
}

/// Durable delayed-task scheduler.
///
/// Owns the task store and the handler registry. Share it as
/// `Arc<TaskScheduler<S>>` between the API surface and the dispatcher.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_delay_queue::core::{TaskConfig, TaskRegistry, TaskScheduler};
/// use prometheus_delay_queue::infra::InMemoryTaskStore;
///
/// let scheduler = TaskScheduler::new(InMemoryTaskStore::new(), registry);
/// let record = scheduler.schedule_task(
///     "email",
///     serde_json::json!({ "to": "a@b.c", "subject": "hi", "content": "..." }),
///     now_ms() + 60_000,
///     TaskConfig::new().with_max_attempts(5),
/// )?;
/// ```
pub struct TaskScheduler<S> {
    store: Mutex<S>,
    registry: Arc<TaskRegistry>,
    notifier: Arc<EventNotifier>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    wake: Arc<Notify>,
}

impl<S> TaskScheduler<S>
where
    S: TaskStore,
{
    /// Create a scheduler with default settings and the system clock.
    pub fn new(store: S, registry: TaskRegistry) -> Self {
        Self {
            store: Mutex::new(store),
            registry: Arc::new(registry),
            notifier: Arc::new(EventNotifier::new()),
            clock: Arc::new(SystemClock),
            settings: SchedulerSettings::default(),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Replace the default settings.
    #[must_use]
    pub fn with_settings(mut self, settings: SchedulerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish events through an existing notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Admit a task for execution at `scheduled_for_ms`.
    ///
    /// Checks run in a fixed order and nothing is persisted when one fails:
    /// unknown type, payload validation, schedule in the past, duplicate id.
    ///
    /// # Errors
    ///
    /// Returns the first failed check, or `StoreUnavailable` if the record
    /// could not be persisted.
    pub fn schedule_task(
        &self,
        task_type: impl Into<TaskType>,
        payload: Value,
        scheduled_for_ms: u128,
        config: TaskConfig,
    ) -> Result<TaskRecord, SchedulerError> {
        let task_type = task_type.into();
        let handler = self
            .registry
            .lookup(&task_type)
            .ok_or_else(|| SchedulerError::UnknownTaskType(task_type.clone()))?;
        if !handler.validate(&payload) {
            return Err(SchedulerError::ValidationFailed(task_type));
        }

        let now = self.clock.now_ms();
        if scheduled_for_ms <= now {
            return Err(SchedulerError::InvalidSchedule {
                scheduled_for_ms,
                now_ms: now,
            });
        }

        let record = TaskRecord {
            id: config.id.unwrap_or_else(TaskId::generate),
            task_type,
            payload,
            scheduled_for_ms,
            state: TaskState::Scheduled,
            attempts: 0,
            max_attempts: config
                .max_attempts
                .unwrap_or(self.settings.default_max_attempts)
                .max(1),
            backoff: config.backoff.unwrap_or(self.settings.default_backoff),
            priority: config.priority.unwrap_or_default(),
            timeout_ms: config.timeout_ms,
            last_error: None,
            created_at_ms: now,
            updated_at_ms: now,
            claimed_at_ms: None,
            revision: 0,
        };

        self.store.lock().insert(record.clone())?;

        tracing::info!(
            task_id = %record.id,
            task_type = %record.task_type,
            scheduled_for_ms = %record.scheduled_for_ms,
            max_attempts = record.max_attempts,
            "task scheduled"
        );
        self.emit(&record, EventKind::Scheduled, None);
        self.wake.notify_one();
        Ok(record)
    }

    /// Admit a task to run `delay` from now.
    ///
    /// # Errors
    ///
    /// Same as [`schedule_task`](Self::schedule_task).
    pub fn schedule_in(
        &self,
        task_type: impl Into<TaskType>,
        payload: Value,
        delay: Duration,
        config: TaskConfig,
    ) -> Result<TaskRecord, SchedulerError> {
        let at = self.clock.now_ms().saturating_add(delay.as_millis());
        self.schedule_task(task_type, payload, at, config)
    }

    /// Cancel a non-terminal task.
    ///
    /// An ACTIVE task keeps running, but its outcome is discarded and it will
    /// not be retried.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id and `AlreadyTerminal` for a task that is
    /// COMPLETED, FAILED or CANCELLED. Neither changes the record.
    pub fn cancel_task(&self, id: &TaskId) -> Result<(), SchedulerError> {
        loop {
            let current = self.get_task(id)?;
            if current.is_terminal() {
                return Err(SchedulerError::AlreadyTerminal {
                    id: id.clone(),
                    state: current.state,
                });
            }

            let mut next = current.clone();
            next.state = TaskState::Cancelled;
            next.claimed_at_ms = None;
            next.updated_at_ms = self.clock.now_ms();

            if self.transition(&current, next.clone())? {
                tracing::info!(task_id = %id, from = %current.state, "task cancelled");
                self.emit(&next, EventKind::Cancelled, None);
                return Ok(());
            }
            // Lost a race with a claim or an outcome; re-read and decide again.
        }
    }

    /// Current state of a task.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get_status(&self, id: &TaskId) -> Result<TaskState, SchedulerError> {
        self.get_task(id).map(|record| record.state)
    }

    /// Full record of a task.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get_task(&self, id: &TaskId) -> Result<TaskRecord, SchedulerError> {
        self.store
            .lock()
            .get(id)?
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))
    }

    /// Due records, in dispatch order.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn ready(&self, limit: usize) -> Result<Vec<TaskRecord>, SchedulerError> {
        let now = self.clock.now_ms();
        self.store.lock().ready(now, limit)
    }

    /// Earliest due time among pending records.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn next_due_ms(&self) -> Result<Option<u128>, SchedulerError> {
        self.store.lock().next_due_ms()
    }

    /// Claim a due record for one attempt.
    ///
    /// Returns the ACTIVE record on success and `None` when the record is no
    /// longer claimable (another dispatcher won, it was cancelled, or it is
    /// not due yet).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn claim(&self, record: &TaskRecord) -> Result<Option<TaskRecord>, SchedulerError> {
        let now = self.clock.now_ms();
        if !record.is_due(now) || !record.has_attempts_left() {
            return Ok(None);
        }

        let mut claimed = record.clone();
        claimed.state = TaskState::Active;
        claimed.attempts = record.attempts.saturating_add(1);
        claimed.claimed_at_ms = Some(now);
        claimed.updated_at_ms = now;

        if !self.transition(record, claimed.clone())? {
            tracing::debug!(task_id = %record.id, "claim lost to another writer");
            return Ok(None);
        }
        claimed.revision = record.revision + 1;

        tracing::debug!(
            task_id = %claimed.id,
            task_type = %claimed.task_type,
            attempt = claimed.attempts,
            "task claimed"
        );
        let detail = format!("attempt {}/{}", claimed.attempts, claimed.max_attempts);
        self.emit(&claimed, EventKind::Active, Some(detail));
        Ok(Some(claimed))
    }

    /// Record a successful attempt. Returns the new state, or `None` when the
    /// outcome was discarded because the record moved on (cancelled or
    /// reconciled) while the attempt ran.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn complete(&self, claimed: &TaskRecord) -> Result<Option<TaskState>, SchedulerError> {
        let mut next = claimed.clone();
        next.state = TaskState::Completed;
        next.claimed_at_ms = None;
        next.updated_at_ms = self.clock.now_ms();

        if !self.transition(claimed, next.clone())? {
            self.log_discarded(claimed);
            return Ok(None);
        }

        tracing::info!(
            task_id = %next.id,
            task_type = %next.task_type,
            attempt = next.attempts,
            "task completed"
        );
        self.emit(&next, EventKind::Completed, None);
        Ok(Some(TaskState::Completed))
    }

    /// Record a failed attempt: schedule a retry after the backoff delay, or
    /// mark the task FAILED once its attempts are used up.
    ///
    /// Returns the new state, or `None` when the outcome was discarded.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn fail(
        &self,
        claimed: &TaskRecord,
        reason: &str,
    ) -> Result<Option<TaskState>, SchedulerError> {
        let now = self.clock.now_ms();
        let mut next = claimed.clone();
        next.claimed_at_ms = None;
        next.updated_at_ms = now;
        next.last_error = Some(reason.to_owned());

        let retry_delay_ms = if claimed.has_attempts_left() {
            let delay = claimed
                .backoff
                .delay_ms(claimed.attempts, self.settings.max_backoff_ms);
            next.state = TaskState::Delayed;
            next.scheduled_for_ms = now.saturating_add(u128::from(delay));
            Some(delay)
        } else {
            next.state = TaskState::Failed;
            None
        };

        if !self.transition(claimed, next.clone())? {
            self.log_discarded(claimed);
            return Ok(None);
        }

        if let Some(delay) = retry_delay_ms {
            tracing::warn!(
                task_id = %next.id,
                task_type = %next.task_type,
                attempt = next.attempts,
                max_attempts = next.max_attempts,
                retry_in_ms = delay,
                reason,
                "task attempt failed; retry scheduled"
            );
            self.emit(&next, EventKind::Delayed, Some(reason.to_owned()));
            self.wake.notify_one();
        } else {
            tracing::error!(
                task_id = %next.id,
                task_type = %next.task_type,
                attempts = next.attempts,
                reason,
                "task failed permanently"
            );
            self.emit(&next, EventKind::Failed, Some(reason.to_owned()));
        }
        Ok(Some(next.state))
    }

    /// Apply an attempt outcome through [`complete`](Self::complete) or
    /// [`fail`](Self::fail).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn report(
        &self,
        claimed: &TaskRecord,
        outcome: &Result<(), HandlerError>,
    ) -> Result<Option<TaskState>, SchedulerError> {
        match outcome {
            Ok(()) => self.complete(claimed),
            Err(err) => self.fail(claimed, &err.reason()),
        }
    }

    /// Treat ACTIVE records claimed more than `grace` ago as failed attempts.
    ///
    /// Covers dispatchers that died mid-attempt and outcome reports that never
    /// reached the store. Returns how many records were moved on.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn reconcile(&self, grace: Duration) -> Result<usize, SchedulerError> {
        let cutoff = self.clock.now_ms().saturating_sub(grace.as_millis());
        let stale = self.store.lock().stale_active(cutoff)?;
        if stale.is_empty() {
            return Ok(0);
        }

        let reason = format!("claim expired after {}ms without an outcome", grace.as_millis());
        let mut recovered = 0;
        for record in &stale {
            if self.fail(record, &reason)?.is_some() {
                recovered += 1;
            }
        }
        tracing::warn!(stale = stale.len(), recovered, "reconciled expired claims");
        Ok(recovered)
    }

    /// Delete terminal records last updated more than `retention` ago.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn purge_finished(&self, retention: Duration) -> Result<usize, SchedulerError> {
        let cutoff = self.clock.now_ms().saturating_sub(retention.as_millis());
        let removed = self.store.lock().prune_terminal(cutoff)?;
        if removed > 0 {
            tracing::info!(removed, "purged finished tasks");
        }
        Ok(removed)
    }

    /// Handler for a task type.
    #[must_use]
    pub fn handler_for(&self, task_type: &TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.registry.lookup(task_type)
    }

    /// Context passed to the handler for a claimed record.
    #[must_use]
    pub fn execution_context(&self, claimed: &TaskRecord) -> ExecutionContext {
        ExecutionContext {
            task_id: claimed.id.clone(),
            task_type: claimed.task_type.clone(),
            attempt: claimed.attempts,
            max_attempts: claimed.max_attempts,
        }
    }

    /// Execution timeout for a claimed record, if any.
    #[must_use]
    pub fn timeout_for(&self, claimed: &TaskRecord) -> Option<Duration> {
        claimed
            .timeout_ms
            .or(self.settings.default_timeout_ms)
            .map(Duration::from_millis)
    }

    /// Current time according to the scheduler's clock.
    #[must_use]
    pub fn now_ms(&self) -> u128 {
        self.clock.now_ms()
    }

    /// Signal raised whenever new work may have become due earlier than the
    /// dispatcher expected.
    #[must_use]
    pub fn wake_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Lifecycle event hub.
    #[must_use]
    pub const fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    /// Registered handlers.
    #[must_use]
    pub const fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Number of stored records, terminal ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// CAS `current` to `next`, bumping the revision.
    fn transition(&self, current: &TaskRecord, mut next: TaskRecord) -> Result<bool, SchedulerError> {
        next.revision = current.revision + 1;
        self.store
            .lock()
            .compare_and_set(current.state, current.revision, next)
    }

    fn log_discarded(&self, claimed: &TaskRecord) {
        let state = self
            .store
            .lock()
            .get(&claimed.id)
            .ok()
            .flatten()
            .map(|r| r.state);
        tracing::info!(
            task_id = %claimed.id,
            attempt = claimed.attempts,
            current_state = ?state,
            "attempt outcome discarded; task changed while it ran"
        );
    }

    fn emit(&self, record: &TaskRecord, kind: EventKind, detail: Option<String>) {
        self.notifier.publish(LifecycleEvent {
            id: record.id.clone(),
            task_type: record.task_type.clone(),
            kind,
            timestamp_ms: self.clock.now_ms(),
            detail,
        });
    }
}

impl<S> std::fmt::Debug for TaskScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
