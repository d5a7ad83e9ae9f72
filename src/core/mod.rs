//! Core scheduling model: task records, store contract, scheduler and dispatcher.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod task;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle, DispatcherStats, Spawn};
pub use error::{AppResult, HandlerError, SchedulerError};
pub use events::{
    build_event, EventCallback, EventKind, EventNotifier, InMemoryEventLog, LifecycleEvent,
    SubscriptionId,
};
pub use registry::{ExecutionContext, TaskHandler, TaskRegistry, Typed, TypedTaskHandler};
pub use retry::BackoffPolicy;
pub use scheduler::{SchedulerSettings, TaskScheduler};
pub use store::{DynTaskStore, TaskStore};
pub use task::{TaskConfig, TaskRecord, TaskState};
