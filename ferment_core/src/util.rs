//! Common time helpers for ferment_core.
use chrono::{NaiveDateTime, Timelike};

/// Timestamp format used by every CSV sink.
pub const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// `ts` with seconds and sub-seconds dropped.
#[inline]
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[inline]
pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FMT).to_string()
}
