//! Builders to construct scheduler components from configuration.

pub mod scheduler_builder;

pub use scheduler_builder::{
    dispatcher_config, open_store, scheduler_settings, SchedulerBuilder,
};
