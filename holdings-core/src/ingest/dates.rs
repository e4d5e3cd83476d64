//! As-of date inference: explicit override, file name, in-data column.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use super::mapper::normalize_key;

/// Column keys (normalized) that may carry the as-of date.
pub const DATE_KEYS: [&str; 3] = ["date", "asofdate", "asof"];

/// What to do when no date can be inferred from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFallback {
    /// Use the current local date (live scrapes).
    #[default]
    Today,
    /// Fail the source with `AmbiguousDate` (historical files).
    Reject,
}

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y", "%d-%b-%Y", "%b %d, %Y",
    "%B %d, %Y", "%Y%m%d",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

fn filename_patterns() -> &'static [(Regex, [usize; 3])] {
    static PATTERNS: OnceLock<Vec<(Regex, [usize; 3])>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Capture group order per pattern: [year, month, day].
        [
            (r"(\d{4})[-_](\d{2})[-_](\d{2})", [1, 2, 3]),
            (r"(\d{2})[-_](\d{2})[-_](\d{4})", [3, 1, 2]),
        ]
        .into_iter()
        .filter_map(|(pattern, groups)| Regex::new(pattern).ok().map(|re| (re, groups)))
        .collect()
    })
}

/// Infer a date from a file stem such as `holdings_2024-01-31.xlsx` or
/// `YYY_01_31_2024.csv`. A match that is not a real calendar date falls
/// through to the next pattern.
pub fn infer_date_from_filename(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_string_lossy();
    filename_patterns().iter().find_map(|(re, [y, m, d])| {
        let caps = re.captures(&stem)?;
        let year = caps.get(*y)?.as_str().parse().ok()?;
        let month = caps.get(*m)?.as_str().parse().ok()?;
        let day = caps.get(*d)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Parse free-form date text as found in holdings exports.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    {
        return Some(date);
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(dt.date());
    }
    // "2024-01-31 00:00" and friends: retry on the leading date token.
    let head = text.split(|c: char| c == ' ' || c == 'T').next()?;
    if head.len() < text.len() {
        return DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok());
    }
    None
}

/// Excel serial day number (1899-12-30 epoch) to a date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn date_from_cell(value: &AnyValue<'_>) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    match value {
        AnyValue::Date(days) => epoch.checked_add_signed(Duration::days(i64::from(*days))),
        AnyValue::Datetime(v, unit, _) => {
            let millis = match unit {
                TimeUnit::Nanoseconds => v / 1_000_000,
                TimeUnit::Microseconds => v / 1_000,
                TimeUnit::Milliseconds => *v,
            };
            chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
        }
        AnyValue::String(s) => parse_date_text(s),
        AnyValue::StringOwned(s) => parse_date_text(s.as_str()),
        _ => None,
    }
}

/// Look for a date-like column and parse its first non-null value.
///
/// Keys are tried in [`DATE_KEYS`] order; an unparsable first value moves
/// on to the next key rather than scanning further down the column.
pub fn extract_as_of_date(df: &DataFrame) -> Option<NaiveDate> {
    if df.height() == 0 {
        return None;
    }
    DATE_KEYS.iter().find_map(|key| {
        let column = df
            .get_columns()
            .iter()
            .find(|c| normalize_key(c.name().as_str()) == *key)?;
        let series = column.as_materialized_series();
        let first = (0..series.len())
            .filter_map(|i| series.get(i).ok())
            .find(|v| !v.is_null() && !matches!(v, AnyValue::String(s) if s.trim().is_empty()))?;
        date_from_cell(&first)
    })
}
