//! Credit awards for accumulated time.

use chrono::TimeDelta;

use crate::policy::Tier;

/// Credits awarded for a total: nothing under an hour, 3 from one hour, 5
/// from two hours.
///
/// The tier is accepted so callers do not need to special-case it, but the
/// award is currently the same for every tier.
pub fn credits(total: TimeDelta, _tier: Tier) -> u32 {
    if total >= TimeDelta::hours(2) {
        5
    } else if total >= TimeDelta::hours(1) {
        3
    } else {
        0
    }
}
