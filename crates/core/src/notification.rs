use std::sync::Arc;

use tracing::warn;

use crate::models::{Notification, NotificationLevel};
use crate::traits::Notifier;

/// Thin wrapper around an optional [`Notifier`].
///
/// Delivery is fire-and-forget: each notification is sent from its own spawned
/// task, so a slow or hung notifier never blocks the caller. Failures are logged
/// and swallowed. Must be used from within a tokio runtime.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    source: String,
}

impl NotificationDispatcher {
    pub fn new(notifier: Option<Arc<dyn Notifier>>, source: impl Into<String>) -> Self {
        Self {
            notifier,
            source: source.into(),
        }
    }

    /// Dispatcher that drops every notification
    pub fn disabled(source: impl Into<String>) -> Self {
        Self::new(None, source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub async fn info(&self, message: impl Into<String>, data: serde_json::Value) {
        self.send(NotificationLevel::Info, message.into(), data).await;
    }

    pub async fn warn(&self, message: impl Into<String>, data: serde_json::Value) {
        self.send(NotificationLevel::Warn, message.into(), data).await;
    }

    pub async fn error(&self, message: impl Into<String>, data: serde_json::Value) {
        self.send(NotificationLevel::Error, message.into(), data).await;
    }

    async fn send(&self, level: NotificationLevel, message: String, data: serde_json::Value) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let notification = Notification::new(level, message, self.source.clone(), data);
        let notifier = notifier.clone();
        let source = self.source.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(notification).await {
                warn!(source = %source, error = %e, "Failed to deliver notification");
            }
        });
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
