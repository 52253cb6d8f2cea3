use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
pub const HUMAN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SECONDS_PER_DAY: i64 = 86_400;

/// Formats a duration as `HH:MM:SS`, prefixed with the day count once it
/// reaches a full day: `1 day, 02:00:00`, `3 days, 00:00:05`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / SECONDS_PER_DAY;
    let rest = seconds % SECONDS_PER_DAY;
    let clock = format!(
        "{:02}:{:02}:{:02}",
        rest / 3600,
        (rest % 3600) / 60,
        rest % 60
    );

    match days {
        0 => clock,
        days if days % 10 == 1 && days % 100 != 11 => format!("{days} day, {clock}"),
        days => format!("{days} days, {clock}"),
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .with_context(|| format!("Invalid date format: {input}. Example: 2026-02-18"))
}

pub fn format_storage(moment: NaiveDateTime) -> String {
    moment.format(STORAGE_FORMAT).to_string()
}

/// Renders a stored creation date for display, leaving unparsable values as they are.
pub fn human_datetime(stored: &str) -> String {
    NaiveDateTime::parse_from_str(stored, STORAGE_FORMAT)
        .map(|moment| moment.format(HUMAN_FORMAT).to_string())
        .unwrap_or_else(|_| stored.to_string())
}
