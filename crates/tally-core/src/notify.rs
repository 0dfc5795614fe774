//! Outbound notifications.
//!
//! The core decides *when* something is worth announcing; adapters behind
//! [`NotificationPort`] decide how it is delivered. Delivery is
//! fire-and-forget from the core's point of view: [`deliver`] bounds every
//! send with a timeout and only logs failures.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::format::format_duration_human;
use crate::ledger::MilestoneHit;
use crate::types::UserKey;

/// Notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKind {
    MilestoneReached,
    PausedNotice,
    ResumedNotice,
    AutoCancelled,
    CancelledNotice,
}

impl NotificationKind {
    pub const ALL: [Self; 5] = [
        Self::MilestoneReached,
        Self::PausedNotice,
        Self::ResumedNotice,
        Self::AutoCancelled,
        Self::CancelledNotice,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MilestoneReached => "milestone_reached",
            Self::PausedNotice => "paused_notice",
            Self::ResumedNotice => "resumed_notice",
            Self::AutoCancelled => "auto_cancelled",
            Self::CancelledNotice => "cancelled_notice",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownNotificationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownNotificationKind(s.to_string()))
    }
}

impl Serialize for NotificationKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown notification kind strings.
#[derive(Debug, Clone)]
pub struct UnknownNotificationKind(String);

impl fmt::Display for UnknownNotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown notification kind: {}", self.0)
    }
}

impl std::error::Error for UnknownNotificationKind {}

/// What happened, with the figures an adapter may want to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    MilestoneReached {
        hours: i64,
        total_secs: i64,
    },
    PausedNotice {
        session_secs: i64,
        total_secs: i64,
        pause_count: u32,
    },
    ResumedNotice {
        paused_secs: i64,
        total_secs: i64,
    },
    AutoCancelled {
        total_secs: i64,
        pause_count: u32,
    },
    CancelledNotice {
        cancelled_secs: i64,
    },
}

impl NotificationEvent {
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::MilestoneReached { .. } => NotificationKind::MilestoneReached,
            Self::PausedNotice { .. } => NotificationKind::PausedNotice,
            Self::ResumedNotice { .. } => NotificationKind::ResumedNotice,
            Self::AutoCancelled { .. } => NotificationKind::AutoCancelled,
            Self::CancelledNotice { .. } => NotificationKind::CancelledNotice,
        }
    }
}

/// A notification about one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user: UserKey,
    pub display_name: String,
    /// Who triggered the change, when it was a person rather than the scanner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: NotificationEvent,
}

impl Notification {
    pub fn new(
        user: UserKey,
        display_name: impl Into<String>,
        at: DateTime<Utc>,
        event: NotificationEvent,
    ) -> Self {
        Self {
            user,
            display_name: display_name.into(),
            actor: None,
            at,
            event,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub const fn kind(&self) -> NotificationKind {
        self.event.kind()
    }

    /// The announcement for a milestone applied by the ledger.
    pub fn milestone(hit: &MilestoneHit) -> Self {
        Self::new(
            hit.key,
            hit.display_name.clone(),
            hit.at,
            NotificationEvent::MilestoneReached {
                hours: hit.hours,
                total_secs: hit.total.num_seconds(),
            },
        )
    }
}

/// One-line plain summary, for logs and simple sinks.
impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.display_name;
        match &self.event {
            NotificationEvent::MilestoneReached { hours, total_secs } => {
                let unit = if *hours == 1 { "hour" } else { "hours" };
                write!(
                    f,
                    "{name} completed {hours} {unit} (total: {})",
                    format_duration_human(*total_secs)
                )?;
            }
            NotificationEvent::PausedNotice {
                session_secs,
                total_secs,
                pause_count,
            } => {
                let unit = if *pause_count == 1 { "pause" } else { "pauses" };
                write!(
                    f,
                    "{name} paused after {} (total: {}, {pause_count} {unit})",
                    format_duration_human(*session_secs),
                    format_duration_human(*total_secs)
                )?;
            }
            NotificationEvent::ResumedNotice {
                paused_secs,
                total_secs,
            } => {
                write!(
                    f,
                    "{name} resumed after a {} pause (total: {})",
                    format_duration_human(*paused_secs),
                    format_duration_human(*total_secs)
                )?;
            }
            NotificationEvent::AutoCancelled {
                total_secs,
                pause_count,
            } => {
                write!(
                    f,
                    "{name} was cancelled automatically after {pause_count} pauses (lost: {})",
                    format_duration_human(*total_secs)
                )?;
            }
            NotificationEvent::CancelledNotice { cancelled_secs } => {
                write!(
                    f,
                    "{name} was cancelled (discarded: {})",
                    format_duration_human(*cancelled_secs)
                )?;
            }
        }
        if let Some(actor) = &self.actor {
            write!(f, " by {actor}")?;
        }
        Ok(())
    }
}

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The sink did not answer in time.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    /// The sink answered with a failure.
    #[error("sink rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The notification could not be handed to the sink.
    #[error("delivery failed: {source}")]
    Delivery {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Where notifications go.
pub trait NotificationPort: Send + Sync {
    fn send(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

impl<N: NotificationPort> NotificationPort for Arc<N> {
    fn send(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send {
        (**self).send(notification)
    }
}

/// Sends a notification, giving up after `timeout`.
///
/// Failures are logged and swallowed; the return value only says whether
/// the sink accepted the notification.
pub async fn deliver<N: NotificationPort>(
    port: &N,
    notification: &Notification,
    timeout: Duration,
) -> bool {
    let result = match tokio::time::timeout(timeout, port.send(notification)).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Timeout(timeout)),
    };
    match result {
        Ok(()) => {
            tracing::debug!(
                kind = %notification.kind(),
                user = %notification.user,
                "notification delivered"
            );
            true
        }
        Err(err) => {
            tracing::warn!(
                kind = %notification.kind(),
                user = %notification.user,
                error = %err,
                "notification not delivered"
            );
            false
        }
    }
}
