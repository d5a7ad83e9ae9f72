//! Email delivery handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{ExecutionContext, HandlerError, TypedTaskHandler};

/// Attachment carried inline in the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAttachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// Attachment body.
    pub content: String,
    /// MIME type.
    #[serde(alias = "contentType")]
    pub content_type: String,
}

/// Payload of an `email` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTaskData {
    /// User the email is sent on behalf of.
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Free-form caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Recipient address.
    #[serde(default)]
    pub to: String,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// HTML body.
    #[serde(default)]
    pub content: String,
    /// Attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<EmailAttachment>,
}

/// Message handed to an [`EmailTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Sender address, if configured.
    pub from: Option<String>,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Attachments.
    pub attachments: Vec<EmailAttachment>,
}

/// Outbound mail provider.
#[async_trait]
pub trait EmailTransport: Send + Sync + 'static {
    /// Send one message.
    async fn send(&self, message: &EmailMessage) -> Result<(), String>;
}

/// Transport that only logs the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmailTransport;

#[async_trait]
impl EmailTransport for TracingEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), String> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "email sent (log transport)"
        );
        Ok(())
    }
}

/// Handler for `email` tasks.
#[derive(Debug, Clone)]
pub struct EmailTaskHandler<T> {
    transport: T,
    from: Option<String>,
}

impl<T> EmailTaskHandler<T>
where
    T: EmailTransport,
{
    /// Handler sending through `transport`.
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            from: None,
        }
    }

    /// Set the sender address.
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

#[async_trait]
impl<T> TypedTaskHandler for EmailTaskHandler<T>
where
    T: EmailTransport,
{
    type Payload = EmailTaskData;

    fn validate(&self, payload: &EmailTaskData) -> bool {
        !payload.to.trim().is_empty()
            && !payload.subject.trim().is_empty()
            && !payload.content.is_empty()
    }

    async fn execute(&self, payload: EmailTaskData, ctx: ExecutionContext) -> Result<(), HandlerError> {
        let message = EmailMessage {
            from: self.from.clone(),
            to: payload.to,
            subject: payload.subject,
            html: payload.content,
            attachments: payload.attachments,
        };
        self.transport.send(&message).await.map_err(|e| {
            tracing::warn!(task_id = %ctx.task_id, attempt = ctx.attempt, error = %e, "email send failed");
            HandlerError::failed(format!("failed to send email: {e}"))
        })
    }
}
