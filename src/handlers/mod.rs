//! Built-in task handlers.
//!
//! Both handlers validate their payload at admission and deliver through a
//! transport trait, so the actual mail or push provider is pluggable.

pub mod email;
pub mod notification;

pub use email::{
    EmailAttachment, EmailMessage, EmailTaskData, EmailTaskHandler, EmailTransport,
    TracingEmailTransport,
};
pub use notification::{
    NotificationChannel, NotificationTaskData, NotificationTaskHandler, NotificationTransport,
    TracingNotificationTransport,
};

use crate::core::{TaskRegistry, Typed};
use crate::util::serde::TaskType;

/// Register the email and notification handlers with log-only transports.
pub fn register_builtin_handlers(registry: &mut TaskRegistry) {
    registry.register(
        TaskType::email(),
        Typed::new(EmailTaskHandler::new(TracingEmailTransport)),
    );
    registry.register(
        TaskType::notification(),
        Typed::new(NotificationTaskHandler::new(TracingNotificationTransport)),
    );
}
