//! Per-user tracking records.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::milestone::{HOUR_SECS, MAX_TRACKED_HOURS};

/// Most time a record can bank, in milliseconds.
pub const MAX_BANKED_MS: i64 = MAX_TRACKED_HOURS * HOUR_SECS * 1000;

/// What a user's timer is doing right now.
///
/// The session start and pause timestamps live inside the variants, so a
/// record can never be running without a start time or paused without a
/// pause time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Idle,
    Running {
        started_at: DateTime<Utc>,
    },
    Paused {
        paused_at: DateTime<Utc>,
    },
}

impl ActivityState {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }
}

/// A closed session kept for auditing. Not used to compute totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Everything tracked for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Last display name seen for this user.
    pub display_name: String,

    /// Accumulated time in milliseconds, excluding any running session.
    #[serde(default)]
    pub banked_ms: i64,

    #[serde(default)]
    pub activity: ActivityState,

    /// Pauses since the last reset.
    #[serde(default)]
    pub pause_count: u32,

    /// Hour thresholds, in seconds, that have already been announced.
    #[serde(default)]
    pub notified_milestones: BTreeSet<i64>,

    /// Display-only flag set once an elevated user's milestone was applied.
    #[serde(default)]
    pub milestone_completed: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<SessionEntry>,
}

impl UserRecord {
    /// Creates an idle record with nothing banked.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            banked_ms: 0,
            activity: ActivityState::Idle,
            pause_count: 0,
            notified_milestones: BTreeSet::new(),
            milestone_completed: false,
            sessions: Vec::new(),
        }
    }

    pub fn banked(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.banked_ms.clamp(0, MAX_BANKED_MS))
    }

    /// Elapsed time of the running session, if any.
    pub fn session_elapsed(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        match self.activity {
            ActivityState::Running { started_at } => Some(non_negative(now - started_at)),
            _ => None,
        }
    }

    /// Banked time plus the running session. Paused time is never counted.
    pub fn total_at(&self, now: DateTime<Utc>) -> TimeDelta {
        let session = self.session_elapsed(now).unwrap_or_else(TimeDelta::zero);
        self.banked().checked_add(&session).unwrap_or(TimeDelta::MAX)
    }

    /// How long the record has been paused, zero unless paused.
    pub fn paused_for(&self, now: DateTime<Utc>) -> TimeDelta {
        match self.activity {
            ActivityState::Paused { paused_at } => non_negative(now - paused_at),
            _ => TimeDelta::zero(),
        }
    }

    /// Moves the running session's elapsed time into the bank.
    ///
    /// Returns the folded session, or `None` if nothing was running. The
    /// caller decides which state follows.
    pub(crate) fn fold(&mut self, now: DateTime<Utc>) -> Option<SessionEntry> {
        let ActivityState::Running { started_at } = self.activity else {
            return None;
        };
        let elapsed = non_negative(now - started_at);
        self.banked_ms = self
            .banked_ms
            .saturating_add(elapsed.num_milliseconds())
            .min(MAX_BANKED_MS);
        self.activity = ActivityState::Idle;
        Some(SessionEntry {
            started_at,
            ended_at: now,
            duration_ms: elapsed.num_milliseconds(),
        })
    }

    /// Adds whole minutes to the bank, up to [`MAX_BANKED_MS`].
    /// Non-positive input is ignored.
    pub(crate) fn add_minutes(&mut self, minutes: i64) {
        if minutes > 0 {
            self.banked_ms = self
                .banked_ms
                .saturating_add(minutes.saturating_mul(60_000))
                .min(MAX_BANKED_MS);
        }
    }

    /// Removes whole minutes from the bank, flooring at zero.
    pub(crate) fn subtract_minutes(&mut self, minutes: i64) {
        if minutes > 0 {
            self.banked_ms = self
                .banked_ms
                .saturating_sub(minutes.saturating_mul(60_000))
                .max(0);
        }
    }

    /// Zeroes all accounting while keeping the identity.
    pub(crate) fn reset(&mut self) {
        let display_name = std::mem::take(&mut self.display_name);
        *self = Self::new(display_name);
    }
}

fn non_negative(delta: TimeDelta) -> TimeDelta {
    delta.max(TimeDelta::zero())
}
