//! Status labels for listings.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::policy::Tier;
use crate::record::{ActivityState, UserRecord};

/// What a listing shows next to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Active,
    Paused,
    Finished,
    Inactive,
}

impl DisplayStatus {
    /// Derives the label for a record.
    ///
    /// A paused user counts as finished once a milestone completed them or
    /// their total passed the tier's finishing line (4 hours elevated, 2
    /// hours standard).
    pub fn of(record: &UserRecord, tier: Tier, now: DateTime<Utc>) -> Self {
        match record.activity {
            ActivityState::Running { .. } => Self::Active,
            ActivityState::Idle => Self::Inactive,
            ActivityState::Paused { .. } => {
                let finish_line = match tier {
                    Tier::Elevated => TimeDelta::hours(4),
                    Tier::Standard => TimeDelta::hours(2),
                };
                if record.milestone_completed || record.total_at(now) >= finish_line {
                    Self::Finished
                } else {
                    Self::Paused
                }
            }
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn paused(banked_hours: i64) -> UserRecord {
        let mut record = UserRecord::new("alice");
        record.banked_ms = banked_hours * 3_600_000;
        record.activity = ActivityState::Paused { paused_at: now() };
        record
    }

    #[test]
    fn running_and_idle_map_directly() {
        let mut record = UserRecord::new("alice");
        assert_eq!(DisplayStatus::of(&record, Tier::Standard, now()), DisplayStatus::Inactive);

        record.activity = ActivityState::Running { started_at: now() };
        assert_eq!(DisplayStatus::of(&record, Tier::Standard, now()), DisplayStatus::Active);
    }

    #[test]
    fn paused_users_finish_at_the_tier_line() {
        assert_eq!(DisplayStatus::of(&paused(1), Tier::Standard, now()), DisplayStatus::Paused);
        assert_eq!(DisplayStatus::of(&paused(2), Tier::Standard, now()), DisplayStatus::Finished);
        assert_eq!(DisplayStatus::of(&paused(3), Tier::Elevated, now()), DisplayStatus::Paused);
        assert_eq!(DisplayStatus::of(&paused(4), Tier::Elevated, now()), DisplayStatus::Finished);
    }

    #[test]
    fn completed_flag_finishes_a_paused_user() {
        let mut record = paused(0);
        record.milestone_completed = true;
        assert_eq!(DisplayStatus::of(&record, Tier::Elevated, now()), DisplayStatus::Finished);
    }
}
