pub mod classify;
pub mod doctor;
pub mod export;
pub mod import;
pub mod insights;
pub mod inspect;
pub mod learn;
pub mod purge;
pub mod reset;
pub mod search;
pub mod sweep;

use chrono::{DateTime, Utc};

/// Epoch seconds as `YYYY-MM-DD HH:MM:SS UTC`, or the raw number when out of range.
pub(crate) fn format_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// First `max` chars of `text`, with `...` appended when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
