//! Configuration models for the scheduler, dispatcher and store backend.

pub mod scheduler;

pub use scheduler::{SchedulerConfig, StoreBackendConfig, ENV_PREFIX};
