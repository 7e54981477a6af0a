//! User-facing notifications raised by the export flow.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    /// How long the host should keep the toast visible. `None` keeps the host default.
    pub dismiss_after: Option<Duration>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Info,
            dismiss_after: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Success,
            dismiss_after: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Error,
            dismiss_after: None,
        }
    }

    pub fn dismiss_after(mut self, duration: Duration) -> Self {
        self.dismiss_after = Some(duration);
        self
    }
}

/// Receives notifications. Implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink: writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => error!(target: "resume_api::notify", "{}", notification.message),
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(target: "resume_api::notify", level = ?notification.level, "{}", notification.message)
            }
        }
    }
}
