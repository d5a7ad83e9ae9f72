//! Push, in-app and web notification handler.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{ExecutionContext, HandlerError, TypedTaskHandler};

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationChannel {
    /// Mobile push; needs device tokens.
    Push,
    /// In-app inbox.
    InApp,
    /// Browser notification.
    Web,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Push => "push",
            Self::InApp => "in-app",
            Self::Web => "web",
        })
    }
}

/// Payload of a `notification` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTaskData {
    /// Recipient user.
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Free-form caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Title line.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Delivery channel.
    pub channel: NotificationChannel,
    /// Target devices for push delivery.
    #[serde(default, alias = "deviceTokens", skip_serializing_if = "Vec::is_empty")]
    pub device_tokens: Vec<String>,
}

/// Notification provider.
#[async_trait]
pub trait NotificationTransport: Send + Sync + 'static {
    /// Deliver one notification.
    async fn deliver(&self, notification: &NotificationTaskData) -> Result<(), String>;
}

/// Transport that only logs the notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationTransport;

#[async_trait]
impl NotificationTransport for TracingNotificationTransport {
    async fn deliver(&self, notification: &NotificationTaskData) -> Result<(), String> {
        tracing::info!(
            channel = %notification.channel,
            title = %notification.title,
            devices = notification.device_tokens.len(),
            "notification delivered (log transport)"
        );
        Ok(())
    }
}

/// Handler for `notification` tasks.
#[derive(Debug, Clone)]
pub struct NotificationTaskHandler<T> {
    transport: T,
}

impl<T> NotificationTaskHandler<T>
where
    T: NotificationTransport,
{
    /// Handler delivering through `transport`.
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T> TypedTaskHandler for NotificationTaskHandler<T>
where
    T: NotificationTransport,
{
    type Payload = NotificationTaskData;

    fn validate(&self, payload: &NotificationTaskData) -> bool {
        if payload.title.trim().is_empty() || payload.message.trim().is_empty() {
            return false;
        }
        payload.channel != NotificationChannel::Push
            || payload.device_tokens.iter().any(|t| !t.is_empty())
    }

    async fn execute(
        &self,
        payload: NotificationTaskData,
        ctx: ExecutionContext,
    ) -> Result<(), HandlerError> {
        self.transport.deliver(&payload).await.map_err(|e| {
            tracing::warn!(
                task_id = %ctx.task_id,
                channel = %payload.channel,
                error = %e,
                "notification delivery failed"
            );
            HandlerError::failed(format!("failed to deliver {} notification: {e}", payload.channel))
        })
    }
}
