//! Runtime adapters and the API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    cancel_from_request, health, schedule_from_request, status_from_request, ErrorResponse,
    Health, ScheduleRequest, ScheduledTaskResponse, TaskStatusResponse,
};
pub use tokio_spawner::TokioSpawner;
