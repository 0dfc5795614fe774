//! Tiers and time ceilings.
//!
//! The ledger never enforces ceilings. Command handlers resolve the user's
//! tier, read the current total, and consult [`CeilingPolicy`] before
//! starting a session.

use std::collections::HashSet;
use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::format::format_duration;
use crate::types::UserKey;

/// Capability class of a user, resolved outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Standard,
    Elevated,
}

impl Tier {
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Elevated)
    }
}

/// Resolves the tier of a user.
pub trait TierResolver: Send + Sync {
    fn tier(&self, key: &UserKey) -> Tier;
}

/// A fixed set of elevated users.
///
/// Users addressed only by name are never elevated, since there is no
/// platform identity to attach a role to.
#[derive(Debug, Clone, Default)]
pub struct StaticTiers {
    elevated: HashSet<UserKey>,
}

impl StaticTiers {
    pub fn new(elevated: impl IntoIterator<Item = UserKey>) -> Self {
        Self {
            elevated: elevated.into_iter().collect(),
        }
    }
}

impl TierResolver for StaticTiers {
    fn tier(&self, key: &UserKey) -> Tier {
        if !key.is_external() && self.elevated.contains(key) {
            Tier::Elevated
        } else {
            Tier::Standard
        }
    }
}

/// Returned when a user may not start another session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeilingReached {
    pub ceiling_hours: u32,
    pub total: TimeDelta,
}

impl fmt::Display for CeilingReached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ceiling of {} hour(s) reached (current time: {})",
            self.ceiling_hours,
            format_duration(self.total)
        )
    }
}

impl std::error::Error for CeilingReached {}

/// Maximum total time per tier, in whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeilingPolicy {
    pub standard_hours: u32,
    pub elevated_hours: u32,
}

impl Default for CeilingPolicy {
    fn default() -> Self {
        Self {
            standard_hours: 1,
            elevated_hours: 4,
        }
    }
}

impl CeilingPolicy {
    pub const fn hours(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Standard => self.standard_hours,
            Tier::Elevated => self.elevated_hours,
        }
    }

    /// Refuses once the total is at or over the tier's ceiling.
    pub fn check(&self, total: TimeDelta, tier: Tier) -> Result<(), CeilingReached> {
        let ceiling_hours = self.hours(tier);
        if total >= TimeDelta::hours(i64::from(ceiling_hours)) {
            return Err(CeilingReached {
                ceiling_hours,
                total,
            });
        }
        Ok(())
    }
}
