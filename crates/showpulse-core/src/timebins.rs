//! Weekly time binning.
//!
//! Every stage that buckets by week goes through [`floor_to_monday`] — the
//! week floor is deliberately centralized here because inconsistent timezone
//! handling across sources silently misaligns the panel.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

/// Monday on or before `date`.
#[must_use]
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_monday());
    // Subtracting at most 6 days from any representable date cannot underflow
    // in practice; fall back to the date itself at the calendar boundary.
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// Floor a UTC timestamp to the Monday starting its ISO week.
///
/// Defined as midnight UTC of the Monday on or before the timestamp. This is
/// the only week-floor implementation in the pipeline; per-source code must
/// not reimplement it.
#[must_use]
pub fn floor_to_monday(ts: DateTime<Utc>) -> NaiveDate {
    monday_of(ts.date_naive())
}

/// All week-start Mondays from the week containing `start` through `end`,
/// inclusive. Returns an empty vec when `end` precedes the first Monday's
/// week.
#[must_use]
pub fn week_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut weeks = Vec::new();
    let mut current = monday_of(start);
    while current <= end {
        weeks.push(current);
        match current.checked_add_days(Days::new(7)) {
            Some(next) => current = next,
            None => break,
        }
    }
    weeks
}
