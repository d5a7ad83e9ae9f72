//! Task handler contract and the task-type registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::error::HandlerError;
use crate::util::serde::{TaskId, TaskType};

/// Information about the attempt a handler is executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Task being executed.
    pub task_id: TaskId,
    /// Task type tag.
    pub task_type: TaskType,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Attempt budget of the task.
    pub max_attempts: u32,
}

impl ExecutionContext {
    /// Whether this is the final attempt the task will get.
    #[must_use]
    pub const fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Validation and execution logic for one task type.
///
/// Delivery is at-least-once, so `execute` must be idempotent.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_delay_queue::core::{ExecutionContext, HandlerError, TaskHandler};
///
/// struct Webhook;
///
/// #[async_trait]
/// impl TaskHandler for Webhook {
///     fn validate(&self, payload: &serde_json::Value) -> bool {
///         payload.get("url").and_then(|u| u.as_str()).is_some()
///     }
///
///     async fn execute(
///         &self,
///         payload: serde_json::Value,
///         _ctx: ExecutionContext,
///     ) -> Result<(), HandlerError> {
///         post(&payload).await.map_err(|e| HandlerError::failed(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Check a payload at admission time.
    fn validate(&self, payload: &Value) -> bool;

    /// Run one attempt.
    async fn execute(&self, payload: Value, ctx: ExecutionContext) -> Result<(), HandlerError>;
}

/// Handler working on a typed payload instead of raw JSON.
///
/// Wrap it in [`Typed`] to register it; payloads that do not deserialize into
/// [`TypedTaskHandler::Payload`] fail validation.
#[async_trait]
pub trait TypedTaskHandler: Send + Sync + 'static {
    /// Payload shape.
    type Payload: DeserializeOwned + Send + 'static;

    /// Semantic checks beyond deserialization.
    fn validate(&self, payload: &Self::Payload) -> bool;

    /// Run one attempt.
    async fn execute(
        &self,
        payload: Self::Payload,
        ctx: ExecutionContext,
    ) -> Result<(), HandlerError>;
}

/// Adapter exposing a [`TypedTaskHandler`] as a [`TaskHandler`].
pub struct Typed<H> {
    inner: H,
}

impl<H> Typed<H> {
    /// Wrap a typed handler.
    pub const fn new(inner: H) -> Self {
        Self { inner }
    }

    /// Borrow the wrapped handler.
    pub const fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H> TaskHandler for Typed<H>
where
    H: TypedTaskHandler,
{
    fn validate(&self, payload: &Value) -> bool {
        <H::Payload as Deserialize<'_>>::deserialize(payload)
            .map(|typed| self.inner.validate(&typed))
            .unwrap_or(false)
    }

    async fn execute(&self, payload: Value, ctx: ExecutionContext) -> Result<(), HandlerError> {
        let typed: H::Payload = serde_json::from_value(payload)
            .map_err(|e| HandlerError::failed(format!("payload decode failed: {e}")))?;
        self.inner.execute(typed, ctx).await
    }
}

/// Lookup table from task type to handler.
///
/// Built during startup and then shared read-only behind an [`Arc`].
/// Registering a type twice replaces the earlier handler (last write wins).
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `task_type` to `handler`, returning the handler it replaced.
    pub fn register<H>(
        &mut self,
        task_type: impl Into<TaskType>,
        handler: H,
    ) -> Option<Arc<dyn TaskHandler>>
    where
        H: TaskHandler,
    {
        self.register_arc(task_type, Arc::new(handler))
    }

    /// Same as [`register`](Self::register) for an already shared handler.
    pub fn register_arc(
        &mut self,
        task_type: impl Into<TaskType>,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Arc<dyn TaskHandler>> {
        let task_type = task_type.into();
        let previous = self.handlers.insert(task_type.clone(), handler);
        if previous.is_some() {
            tracing::warn!(task_type = %task_type, "replaced existing task handler");
        } else {
            tracing::debug!(task_type = %task_type, "registered task handler");
        }
        previous
    }

    /// Handler bound to `task_type`, if any.
    #[must_use]
    pub fn lookup(&self, task_type: &TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Whether a handler is bound to `task_type`.
    #[must_use]
    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted.
    #[must_use]
    pub fn task_types(&self) -> Vec<TaskType> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}
