//! HTTP webhook sink.
//!
//! Each notification is POSTed as JSON to the URL routed for its kind,
//! falling back to the default URL. Kinds with no URL are skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_core::{Notification, NotificationKind, NotificationPort, NotifyError};
use thiserror::Error;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Webhook setup errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A configured URL is not a usable http(s) URL.
    #[error("invalid webhook url for {target}: {reason}")]
    InvalidUrl { target: String, reason: String },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// Where to send notifications.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Default target for every kind without its own route.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Per-kind targets.
    pub routes: BTreeMap<NotificationKind, String>,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            routes: BTreeMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: Vec<_> = self.routes.keys().collect();
        f.debug_struct("WebhookConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("routes", &routes)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl WebhookConfig {
    /// Whether any URL is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.url.is_some() || !self.routes.is_empty()
    }

    /// The URL for `kind`, if any.
    pub fn route(&self, kind: NotificationKind) -> Option<&str> {
        self.routes
            .get(&kind)
            .or(self.url.as_ref())
            .map(String::as_str)
    }

    fn validate(&self) -> Result<(), WebhookError> {
        let targets = self
            .url
            .iter()
            .map(|url| ("default".to_string(), url))
            .chain(self.routes.iter().map(|(kind, url)| (kind.to_string(), url)));
        for (target, url) in targets {
            let parsed = reqwest::Url::parse(url).map_err(|err| WebhookError::InvalidUrl {
                target: target.clone(),
                reason: err.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(WebhookError::InvalidUrl {
                    target,
                    reason: format!("unsupported scheme {}", parsed.scheme()),
                });
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    content: String,
    notification: &'a Notification,
}

/// Posts notifications to configured webhooks.
pub struct WebhookNotifier {
    http: reqwest::Client,
    config: WebhookConfig,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    /// Validates the configured URLs and builds the HTTP client.
    pub fn new(config: WebhookConfig) -> Result<Self, WebhookError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(WebhookError::ClientBuild)?;
        Ok(Self { http, config })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn transport_error(&self, err: reqwest::Error) -> NotifyError {
        if err.is_timeout() {
            NotifyError::Timeout(self.timeout())
        } else {
            NotifyError::Delivery {
                source: Box::new(err),
            }
        }
    }
}

impl NotificationPort for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let kind = notification.kind();
        let Some(url) = self.config.route(kind) else {
            tracing::debug!(%kind, "no webhook route; skipping");
            return Ok(());
        };

        let payload = Payload {
            content: notification.to_string(),
            notification,
        };
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(%kind, status = status.as_u16(), "webhook accepted notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use tally_core::{NotificationEvent, UserKey};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Serves a single HTTP request with `status` and returns the raw request.
    async fn serve_once(status: u16) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status} Status\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(request).unwrap()
        });
        (url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn milestone() -> Notification {
        Notification::new(
            UserKey::Known(7),
            "alice",
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            NotificationEvent::MilestoneReached {
                hours: 1,
                total_secs: 3600,
            },
        )
    }

    fn config(url: &str) -> WebhookConfig {
        WebhookConfig {
            url: Some(url.to_string()),
            ..WebhookConfig::default()
        }
    }

    #[test]
    fn routes_fall_back_to_default_url() {
        let mut config = config("https://example.com/all");
        config
            .routes
            .insert(NotificationKind::MilestoneReached, "https://example.com/ms".to_string());

        assert_eq!(
            config.route(NotificationKind::MilestoneReached),
            Some("https://example.com/ms")
        );
        assert_eq!(
            config.route(NotificationKind::PausedNotice),
            Some("https://example.com/all")
        );
        assert_eq!(WebhookConfig::default().route(NotificationKind::PausedNotice), None);
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            WebhookNotifier::new(config("ftp://example.com")),
            Err(WebhookError::InvalidUrl { .. })
        ));
        assert!(matches!(
            WebhookNotifier::new(config("not a url")),
            Err(WebhookError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn debug_redacts_urls() {
        let notifier =
            WebhookNotifier::new(config("https://hooks.example.com/secret-token")).unwrap();
        let debug = format!("{notifier:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn posts_json_payload() {
        let (url, server) = serve_once(200).await;
        let notifier = WebhookNotifier::new(config(&url)).unwrap();

        notifier.send(&milestone()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook HTTP/1.1"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["content"], "alice completed 1 hour (total: 1 hour)");
        assert_eq!(json["notification"]["kind"], "milestone_reached");
        assert_eq!(json["notification"]["user"], "7");
    }

    #[tokio::test]
    async fn error_status_is_rejected() {
        let (url, server) = serve_once(500).await;
        let notifier = WebhookNotifier::new(config(&url)).unwrap();

        let err = notifier.send(&milestone()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 500, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unrouted_kinds_are_skipped() {
        let mut config = WebhookConfig::default();
        config
            .routes
            .insert(NotificationKind::CancelledNotice, "http://127.0.0.1:9/unused".to_string());
        let notifier = WebhookNotifier::new(config).unwrap();

        notifier.send(&milestone()).await.unwrap();
    }
}
