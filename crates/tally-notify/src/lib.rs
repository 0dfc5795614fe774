//! Notification adapters for the activity tally.
//!
//! Provides [`NotificationPort`] implementations:
//! - [`LogNotifier`]: writes each notification to the log
//! - [`WebhookNotifier`]: posts JSON to HTTP webhooks, routed per kind
//!
//! [`Notifier`] picks one of them from configuration.

mod webhook;

use tally_core::{Notification, NotificationPort, NotifyError};

pub use webhook::{DEFAULT_TIMEOUT_SECS, WebhookConfig, WebhookError, WebhookNotifier};

/// Writes notifications to the `tally::notify` log target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationPort for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            target: "tally::notify",
            kind = %notification.kind(),
            user = %notification.user,
            actor = notification.actor.as_deref(),
            "{notification}"
        );
        Ok(())
    }
}

/// The configured sink.
#[derive(Debug)]
pub enum Notifier {
    Log(LogNotifier),
    Webhook(WebhookNotifier),
}

impl Notifier {
    /// Uses webhooks when any URL is configured, the log otherwise.
    pub fn from_config(config: &WebhookConfig) -> Result<Self, WebhookError> {
        if config.is_enabled() {
            Ok(Self::Webhook(WebhookNotifier::new(config.clone())?))
        } else {
            Ok(Self::Log(LogNotifier))
        }
    }
}

impl NotificationPort for Notifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self {
            Self::Log(log) => log.send(notification).await,
            Self::Webhook(webhook) => {
                // webhook deliveries are logged too
                LogNotifier.send(notification).await?;
                webhook.send(notification).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use tally_core::{NotificationEvent, NotificationKind, UserKey};

    use super::*;

    #[test]
    fn empty_config_logs_only() {
        let notifier = Notifier::from_config(&WebhookConfig::default()).unwrap();
        assert!(matches!(notifier, Notifier::Log(_)));
    }

    #[test]
    fn any_route_enables_webhooks() {
        let mut config = WebhookConfig::default();
        config.routes.insert(
            NotificationKind::AutoCancelled,
            "https://example.com/cancel".to_string(),
        );
        let notifier = Notifier::from_config(&config).unwrap();
        assert!(matches!(notifier, Notifier::Webhook(_)));
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let config = WebhookConfig {
            url: Some("example.com/no-scheme".to_string()),
            ..WebhookConfig::default()
        };
        assert!(Notifier::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notification = Notification::new(
            UserKey::Known(3),
            "carol",
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            NotificationEvent::CancelledNotice { cancelled_secs: 42 },
        )
        .with_actor("moderator");
        assert!(LogNotifier.send(&notification).await.is_ok());
    }
}
