//! # Prometheus Delay Queue
//!
//! A durable delayed-task scheduler with bounded retries.
//!
//! Callers schedule a typed task (`email`, `notification`, or any registered
//! type) to run at a future instant. Records live in a [`TaskStore`](core::TaskStore),
//! so scheduled work survives restarts. A dispatcher claims due records with
//! an atomic compare-and-set, runs their handler with bounded concurrency, and
//! either completes the task or schedules a retry with fixed or exponential
//! backoff until the attempt budget is spent.
//!
//! ## Lifecycle
//!
//! ```text
//! SCHEDULED -> ACTIVE -> COMPLETED
//!                     -> DELAYED -> ACTIVE -> ...
//!                     -> FAILED          (attempts exhausted)
//! any non-terminal    -> CANCELLED
//! ```
//!
//! Every transition is published as a [`LifecycleEvent`](core::LifecycleEvent)
//! through the scheduler's [`EventNotifier`](core::EventNotifier).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use prometheus_delay_queue::builders::SchedulerBuilder;
//! use prometheus_delay_queue::core::TaskConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     prometheus_delay_queue::util::init_tracing();
//!
//!     let (scheduler, dispatcher) = SchedulerBuilder::from_env()?
//!         .with_builtin_handlers()
//!         .start()?;
//!
//!     let task = scheduler.schedule_in(
//!         "email",
//!         serde_json::json!({ "to": "ops@example.com", "subject": "Report", "content": "..." }),
//!         Duration::from_secs(60),
//!         TaskConfig::new().with_max_attempts(5),
//!     )?;
//!     println!("scheduled {}", task.id);
//!
//!     tokio::signal::ctrl_c().await?;
//!     dispatcher.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Delivery is at-least-once: an attempt whose outcome never reaches the store
//! is re-run after reconciliation, so handlers must be idempotent.
//!
//! For complete examples, see:
//! - `tests/scheduler_flow_test.rs` - end-to-end dispatch scenarios
//! - `tests/restart_recovery_test.rs` - durability across restarts

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Configuration models for the scheduler and its store.
pub mod config;
/// Core scheduling model, scheduler and dispatcher.
pub mod core;
/// Built-in task handlers.
pub mod handlers;
/// Infrastructure adapters for task storage backends.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
