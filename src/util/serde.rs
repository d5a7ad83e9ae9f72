//! Shared serializable identifiers used across the scheduler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a task record.
///
/// Generated as a UUID v4 on admission unless the caller supplies its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Tag selecting the handler for a task.
///
/// The built-in tags are [`TaskType::EMAIL`] and [`TaskType::NOTIFICATION`];
/// any other tag becomes valid once a handler is registered for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    /// Tag of the built-in email handler.
    pub const EMAIL: &'static str = "email";
    /// Tag of the built-in notification handler.
    pub const NOTIFICATION: &'static str = "notification";

    /// Create a task type from a tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The `email` task type.
    #[must_use]
    pub fn email() -> Self {
        Self::new(Self::EMAIL)
    }

    /// The `notification` task type.
    #[must_use]
    pub fn notification() -> Self {
        Self::new(Self::NOTIFICATION)
    }

    /// Borrow the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
