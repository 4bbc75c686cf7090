//! Clock helpers: quiet-window membership and HH:MM parsing.
//!
//! The quiet window is a daily wall-clock interval. When start > end the
//! window crosses midnight (e.g. 23:00 -> 07:00).

use chrono::{NaiveTime, Timelike, Utc};

/// Parse a "HH:MM" clock string
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Current UTC time of day
pub fn now_time() -> NaiveTime {
    let now = Utc::now();
    // truncate to whole seconds so equality checks behave
    NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
        .unwrap_or_else(|| now.time())
}

/// True when `t` falls inside the [start, end) window, handling the
/// midnight wraparound case (start > end).
pub fn in_quiet_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= t && t < end
    } else {
        t >= start || t < end
    }
}
