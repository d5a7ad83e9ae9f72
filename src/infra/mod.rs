//! Infrastructure adapters for task storage backends.

pub mod store;

pub use store::{FileTaskStore, InMemoryTaskStore};
