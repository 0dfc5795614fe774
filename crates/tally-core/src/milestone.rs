//! Whole-hour milestone arithmetic.

use std::collections::BTreeSet;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Length of one milestone step, in seconds.
pub const HOUR_SECS: i64 = 3600;

/// Highest hour milestone ever tracked. Banked time is capped here too.
pub const MAX_TRACKED_HOURS: i64 = 10_000;

/// Which scanner pass is applying milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sweep {
    /// Reconciles every user against their stored total.
    CatchUp,
    /// Looks only at running sessions that have lasted at least an hour.
    Live,
}

/// Number of complete hours in `total`.
pub fn whole_hours(total: TimeDelta) -> i64 {
    total.num_seconds().max(0) / HOUR_SECS
}

/// Hour thresholds reached by `total` that are not in `notified`, ascending.
/// Nothing past [`MAX_TRACKED_HOURS`] is reported.
pub fn missing_thresholds(total: TimeDelta, notified: &BTreeSet<i64>) -> Vec<i64> {
    (1..=whole_hours(total).min(MAX_TRACKED_HOURS))
        .map(|hour| hour * HOUR_SECS)
        .filter(|threshold| !notified.contains(threshold))
        .collect()
}
