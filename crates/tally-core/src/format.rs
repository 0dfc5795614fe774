//! Human-readable durations.

use chrono::TimeDelta;

const UNITS: [(&str, i64); 3] = [("hour", 3600), ("minute", 60), ("second", 1)];

/// Formats whole seconds as `"1 hour, 2 minutes, 5 seconds"`.
///
/// Zero units are left out, except that seconds are shown when everything
/// else is zero. Negative input formats like zero.
pub fn format_duration_human(seconds: i64) -> String {
    let mut remaining = seconds.max(0);
    let mut parts = Vec::with_capacity(UNITS.len());

    for (name, size) in UNITS {
        let count = remaining / size;
        remaining %= size;
        let is_last = size == 1;
        if count > 0 || (is_last && parts.is_empty()) {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {name}{plural}"));
        }
    }

    parts.join(", ")
}

/// Formats a duration, truncating to whole seconds.
pub fn format_duration(duration: TimeDelta) -> String {
    format_duration_human(duration.num_seconds())
}
