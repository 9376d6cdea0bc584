//! Push notification display.

use std::sync::Arc;

use async_trait::async_trait;
use sitecache_core::{Error, NotificationConfig};

use crate::host::{ExtendableEvent, NotificationOptions, Notifier, PushHandler};

/// Turns push payloads into notification display requests.
pub struct NotificationPresenter {
    config: NotificationConfig,
    notifier: Arc<dyn Notifier>,
}

impl NotificationPresenter {
    pub fn new(config: NotificationConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    /// Display options for a payload.
    ///
    /// A present payload is used as the body verbatim, even when empty; the
    /// configured default applies only when there is no payload at all.
    pub fn options_for(&self, payload: Option<&str>) -> NotificationOptions {
        NotificationOptions {
            body: payload.map_or_else(|| self.config.default_body.clone(), str::to_string),
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            vibrate: self.config.vibrate.clone(),
        }
    }
}

#[async_trait]
impl PushHandler for NotificationPresenter {
    async fn push(&self, payload: Option<&str>, _event: &ExtendableEvent) -> Result<(), Error> {
        let options = self.options_for(payload);
        tracing::debug!(title = %self.config.title, has_payload = payload.is_some(), "showing notification");
        self.notifier.show_notification(&self.config.title, options).await
    }
}
