//! Builder turning a [`SchedulerConfig`] and handlers into a running scheduler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::{SchedulerConfig, StoreBackendConfig};
use crate::core::{
    AppResult, Dispatcher, DispatcherConfig, DispatcherHandle, DynTaskStore, EventNotifier,
    SchedulerError, SchedulerSettings, Spawn, TaskHandler, TaskRegistry, TaskScheduler,
};
use crate::handlers::register_builtin_handlers;
use crate::infra::{FileTaskStore, InMemoryTaskStore};
use crate::runtime::TokioSpawner;
use crate::util::clock::Clock;
use crate::util::serde::TaskType;

/// Scheduler defaults derived from configuration.
#[must_use]
pub fn scheduler_settings(cfg: &SchedulerConfig) -> SchedulerSettings {
    SchedulerSettings {
        default_max_attempts: cfg.default_max_attempts,
        default_backoff: cfg.default_backoff,
        max_backoff_ms: cfg.max_backoff_ms,
        default_timeout_ms: cfg.default_timeout_ms,
    }
}

/// Dispatcher tuning derived from configuration.
#[must_use]
pub fn dispatcher_config(cfg: &SchedulerConfig) -> DispatcherConfig {
    DispatcherConfig {
        concurrency: cfg.concurrency,
        poll_interval: Duration::from_millis(cfg.poll_interval_ms),
        claim_grace: Duration::from_millis(cfg.claim_grace_ms),
        reconcile_interval: Duration::from_millis(cfg.reconcile_interval_ms),
        retention: cfg.retention_ms.map(Duration::from_millis),
        ..DispatcherConfig::default()
    }
}

/// Open the configured store backend.
///
/// # Errors
///
/// `StoreUnavailable` when the file store cannot be opened.
pub fn open_store(cfg: &StoreBackendConfig) -> Result<DynTaskStore, SchedulerError> {
    match cfg {
        StoreBackendConfig::InMemory => Ok(Box::new(InMemoryTaskStore::new())),
        StoreBackendConfig::File { path, stream } => {
            Ok(Box::new(FileTaskStore::open(path, stream.clone())?))
        }
    }
}

/// Assembles a [`TaskScheduler`] and its [`Dispatcher`].
///
/// # Example
///
/// ```rust,ignore
/// let (scheduler, dispatcher) = SchedulerBuilder::from_env()?
///     .with_builtin_handlers()
///     .register("webhook", Webhook)
///     .start()?;
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    registry: TaskRegistry,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<EventNotifier>>,
}

impl SchedulerBuilder {
    /// Start from a configuration with no handlers registered.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            registry: TaskRegistry::new(),
            clock: None,
            notifier: None,
        }
    }

    /// Start from `DELAY_QUEUE_*` environment variables.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when a variable is malformed.
    pub fn from_env() -> Result<Self, SchedulerError> {
        SchedulerConfig::from_env()
            .map(Self::new)
            .map_err(SchedulerError::InvalidConfig)
    }

    /// Replace the handler registry.
    #[must_use]
    pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a handler.
    #[must_use]
    pub fn register<H>(mut self, task_type: impl Into<TaskType>, handler: H) -> Self
    where
        H: TaskHandler,
    {
        self.registry.register(task_type, handler);
        self
    }

    /// Register the email and notification handlers with log-only transports.
    #[must_use]
    pub fn with_builtin_handlers(mut self) -> Self {
        register_builtin_handlers(&mut self.registry);
        self
    }

    /// Use a custom time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Publish lifecycle events through an existing notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Configuration the builder was created with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate the configuration, open the store and build the scheduler.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a rejected configuration, `StoreUnavailable` when
    /// the store cannot be opened.
    pub fn build(self) -> Result<Arc<TaskScheduler<DynTaskStore>>, SchedulerError> {
        self.config
            .validate()
            .map_err(SchedulerError::InvalidConfig)?;
        if self.registry.is_empty() {
            tracing::warn!("building scheduler with no task handlers registered");
        }

        let store = open_store(&self.config.store)?;
        let mut scheduler = TaskScheduler::new(store, self.registry)
            .with_settings(scheduler_settings(&self.config));
        if let Some(clock) = self.clock {
            scheduler = scheduler.with_clock(clock);
        }
        if let Some(notifier) = self.notifier {
            scheduler = scheduler.with_notifier(notifier);
        }

        tracing::info!(
            task_types = ?scheduler.registry().task_types(),
            stored = scheduler.len(),
            "scheduler built"
        );
        Ok(Arc::new(scheduler))
    }

    /// Build the scheduler and a dispatcher spawning through `spawner`.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_with_dispatcher<X>(
        self,
        spawner: X,
    ) -> Result<(Arc<TaskScheduler<DynTaskStore>>, Dispatcher<DynTaskStore, X>), SchedulerError>
    where
        X: Spawn + Send + Sync + 'static,
    {
        let dispatcher_cfg = dispatcher_config(&self.config);
        let scheduler = self.build()?;
        let dispatcher = Dispatcher::new(Arc::clone(&scheduler), dispatcher_cfg, spawner);
        Ok((scheduler, dispatcher))
    }

    /// Build everything and start dispatching on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails outside a tokio runtime or when [`build`](Self::build) fails.
    pub fn start(self) -> AppResult<(Arc<TaskScheduler<DynTaskStore>>, DispatcherHandle)> {
        let spawner = TokioSpawner::current().context("dispatcher needs a tokio runtime")?;
        let (scheduler, dispatcher) = self
            .build_with_dispatcher(spawner)
            .context("failed to build scheduler")?;
        Ok((scheduler, dispatcher.start()))
    }
}

impl std::fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
