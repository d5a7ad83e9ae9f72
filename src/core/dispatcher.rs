//! Dispatcher: polls the scheduler for due tasks and executes them with
//! bounded concurrency.
//!
//! A worker permit is taken from the semaphore before a record is claimed, so
//! due work beyond capacity stays in the store until a worker frees up.
//! Handler failures, timeouts and panics all come back to the scheduler as a
//! [`HandlerError`] and go through the same retry decision.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::core::error::{HandlerError, SchedulerError};
use crate::core::scheduler::TaskScheduler;
use crate::core::store::TaskStore;
use crate::core::task::TaskRecord;

/// Ceiling for the polling backoff after store errors.
const MAX_STORE_BACKOFF: Duration = Duration::from_secs(30);

/// First delay between outcome report retries.
const REPORT_RETRY_BASE: Duration = Duration::from_millis(100);

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn a future to run to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum concurrently executing tasks.
    pub concurrency: usize,
    /// Longest sleep between readiness queries.
    pub poll_interval: Duration,
    /// Age after which an ACTIVE claim is considered abandoned.
    pub claim_grace: Duration,
    /// How often reconciliation (and purging) runs.
    pub reconcile_interval: Duration,
    /// Keep terminal records this long; `None` keeps them forever.
    pub retention: Option<Duration>,
    /// Extra tries for an outcome report that hits a store error.
    pub report_retries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(1),
            claim_grace: Duration::from_secs(300),
            reconcile_interval: Duration::from_secs(30),
            retention: None,
            report_retries: 3,
        }
    }
}

/// Lock-free dispatcher counters.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    claimed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl DispatcherStats {
    /// Records claimed by this dispatcher.
    #[must_use]
    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Acquire)
    }

    /// Attempts that finished successfully.
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Acquire)
    }

    /// Attempts that failed, timed out or panicked.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// Attempts currently executing.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of attempts observed executing at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    fn started(&self) {
        self.claimed.fetch_add(1, Ordering::AcqRel);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    fn finished(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::AcqRel);
        } else {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// How a dispatch pass ended.
enum Pass {
    /// Nothing more is due right now.
    Drained,
    /// Due records exist but none could be claimed.
    Contended,
    /// Shutdown was requested while waiting for a worker.
    Stopped,
}

/// Polling dispatcher bound to one scheduler.
pub struct Dispatcher<S, X> {
    scheduler: Arc<TaskScheduler<S>>,
    config: DispatcherConfig,
    spawner: X,
    semaphore: Arc<Semaphore>,
    stats: Arc<DispatcherStats>,
}

impl<S, X> Dispatcher<S, X>
where
    S: TaskStore + Send + 'static,
    X: Spawn + Send + Sync + 'static,
{
    /// Create a dispatcher. Nothing runs until [`start`](Self::start).
    pub fn new(scheduler: Arc<TaskScheduler<S>>, config: DispatcherConfig, spawner: X) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            scheduler,
            config,
            spawner,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    /// Counters shared with the running loop.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn the polling loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let semaphore = Arc::clone(&self.semaphore);
        let stats = Arc::clone(&self.stats);
        let concurrency = u32::try_from(self.config.concurrency.max(1)).unwrap_or(u32::MAX);

        tracing::info!(
            concurrency,
            poll_interval_ms = %self.config.poll_interval.as_millis(),
            "dispatcher starting"
        );
        let driver = tokio::spawn(self.run(shutdown_rx));

        DispatcherHandle {
            shutdown: shutdown_tx,
            driver,
            semaphore,
            concurrency,
            stats,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let wake = self.scheduler.wake_signal();
        self.maintain();
        let mut last_maintenance = Instant::now();
        let mut store_failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let mut wait = match self.dispatch_ready(&mut shutdown).await {
                Ok(Pass::Stopped) => break,
                Ok(pass) => {
                    if store_failures > 0 {
                        tracing::info!(store_failures, "store reachable again");
                        store_failures = 0;
                    }
                    self.idle_wait(&pass)
                }
                Err(err) => {
                    store_failures = store_failures.saturating_add(1);
                    let backoff = self.store_backoff(store_failures);
                    tracing::warn!(
                        error = %err,
                        store_failures,
                        retry_in_ms = %backoff.as_millis(),
                        "dispatch pass failed; backing off"
                    );
                    backoff
                }
            };

            let since_maintenance = last_maintenance.elapsed();
            if since_maintenance >= self.config.reconcile_interval {
                self.maintain();
                last_maintenance = Instant::now();
            } else {
                wait = wait.min(self.config.reconcile_interval - since_maintenance);
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = wake.notified() => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
        tracing::info!("dispatcher loop stopped");
    }

    /// Claim and spawn due records until nothing is due or capacity runs out.
    async fn dispatch_ready(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Pass, SchedulerError> {
        loop {
            let Some(first) = self.acquire_permit(shutdown).await else {
                return Ok(Pass::Stopped);
            };
            let batch = self.semaphore.available_permits().saturating_add(1);
            let due = self.scheduler.ready(batch)?;
            if due.is_empty() {
                return Ok(Pass::Drained);
            }
            tracing::debug!(due = due.len(), "dispatch pass");

            let mut spare = Some(first);
            let mut started = 0usize;
            let mut out_of_permits = false;
            for record in &due {
                let permit = match spare.take() {
                    Some(permit) => permit,
                    None => match Arc::clone(&self.semaphore).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            out_of_permits = true;
                            break;
                        }
                    },
                };
                match self.scheduler.claim(record)? {
                    Some(claimed) => {
                        started += 1;
                        self.spawn_execution(claimed, permit);
                    }
                    None => spare = Some(permit),
                }
            }

            if started == 0 {
                return Ok(Pass::Contended);
            }
            if !out_of_permits && due.len() < batch {
                return Ok(Pass::Drained);
            }
        }
    }

    async fn acquire_permit(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<OwnedSemaphorePermit> {
        if *shutdown.borrow() {
            return None;
        }
        tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
            _ = shutdown.changed() => None,
        }
    }

    fn spawn_execution(&self, claimed: TaskRecord, permit: OwnedSemaphorePermit) {
        let scheduler = Arc::clone(&self.scheduler);
        let stats = Arc::clone(&self.stats);
        let report_retries = self.config.report_retries;
        stats.started();

        self.spawner.spawn(async move {
            tracing::debug!(
                task_id = %claimed.id,
                task_type = %claimed.task_type,
                attempt = claimed.attempts,
                "executing task"
            );
            let outcome = execute_attempt(&scheduler, &claimed).await;
            stats.finished(outcome.is_ok());
            report_outcome(&scheduler, &claimed, &outcome, report_retries).await;
            drop(permit);
        });
    }

    fn idle_wait(&self, pass: &Pass) -> Duration {
        let poll = self.config.poll_interval;
        if !matches!(pass, Pass::Drained) {
            return poll;
        }
        match self.scheduler.next_due_ms() {
            Ok(Some(due)) => {
                let until = due.saturating_sub(self.scheduler.now_ms());
                Duration::from_millis(u64::try_from(until).unwrap_or(u64::MAX)).min(poll)
            }
            Ok(None) => poll,
            Err(err) => {
                tracing::warn!(error = %err, "next due time unavailable");
                poll
            }
        }
    }

    fn store_backoff(&self, failures: u32) -> Duration {
        let factor = 1u32 << failures.saturating_sub(1).min(10);
        self.config
            .poll_interval
            .saturating_mul(factor)
            .min(MAX_STORE_BACKOFF)
    }

    fn maintain(&self) {
        match self.scheduler.reconcile(self.config.claim_grace) {
            Ok(0) => {}
            Ok(recovered) => tracing::info!(recovered, "recovered abandoned claims"),
            Err(err) => tracing::warn!(error = %err, "reconciliation failed"),
        }
        if let Some(retention) = self.config.retention {
            if let Err(err) = self.scheduler.purge_finished(retention) {
                tracing::warn!(error = %err, "purge of finished tasks failed");
            }
        }
    }
}

impl<S, X> std::fmt::Debug for Dispatcher<S, X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Run one attempt with the task's timeout, turning panics into errors.
async fn execute_attempt<S>(
    scheduler: &TaskScheduler<S>,
    claimed: &TaskRecord,
) -> Result<(), HandlerError>
where
    S: TaskStore,
{
    let Some(handler) = scheduler.handler_for(&claimed.task_type) else {
        return Err(HandlerError::failed(format!(
            "no handler registered for task type {}",
            claimed.task_type
        )));
    };
    let ctx = scheduler.execution_context(claimed);
    let attempt = AssertUnwindSafe(handler.execute(claimed.payload.clone(), ctx)).catch_unwind();

    let result = match scheduler.timeout_for(claimed) {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => {
                let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                return Err(HandlerError::TimedOut(limit_ms));
            }
        },
        None => attempt.await,
    };

    result.unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(&*panic))))
}

/// Report an outcome, retrying store errors a bounded number of times.
///
/// When every try fails the record stays ACTIVE and reconciliation picks it
/// up once the claim grace period passes.
async fn report_outcome<S>(
    scheduler: &TaskScheduler<S>,
    claimed: &TaskRecord,
    outcome: &Result<(), HandlerError>,
    retries: u32,
) where
    S: TaskStore,
{
    let mut delay = REPORT_RETRY_BASE;
    for attempt in 0..=retries {
        match scheduler.report(claimed, outcome) {
            Ok(_) => return,
            Err(err) if attempt < retries => {
                tracing::warn!(
                    task_id = %claimed.id,
                    error = %err,
                    retry_in_ms = %delay.as_millis(),
                    "outcome report failed; retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => {
                tracing::error!(
                    task_id = %claimed.id,
                    error = %err,
                    "outcome report failed; leaving the claim to reconciliation"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Control handle for a running dispatcher.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    driver: JoinHandle<()>,
    semaphore: Arc<Semaphore>,
    concurrency: u32,
    stats: Arc<DispatcherStats>,
}

impl DispatcherHandle {
    /// Counters of the running dispatcher.
    #[must_use]
    pub const fn stats(&self) -> &Arc<DispatcherStats> {
        &self.stats
    }

    /// Whether the polling loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.driver.is_finished()
    }

    /// Stop polling and wait for in-flight attempts to report their outcome.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.driver.await {
            tracing::error!(error = %err, "dispatcher loop ended abnormally");
        }
        // Every worker holds a permit until its outcome is reported.
        match self.semaphore.acquire_many(self.concurrency).await {
            Ok(permits) => drop(permits),
            Err(err) => tracing::warn!(error = %err, "worker semaphore closed during shutdown"),
        }
        tracing::info!(
            claimed = self.stats.claimed(),
            succeeded = self.stats.succeeded(),
            failed = self.stats.failed(),
            "dispatcher stopped"
        );
    }
}
