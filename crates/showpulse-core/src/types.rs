use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Named numeric values for one row. `None` means the source had no data for
/// that column — distinct from `Some(0.0)`, which means observed zero
/// activity. The two are never coerced into each other anywhere in the
/// pipeline.
pub type MetricValues = BTreeMap<String, Option<f64>>;

/// One observed unit from a source: a post, a search-interest sample, a
/// pageview count.
///
/// Records are immutable once created. A later scrape of the same
/// `source_record_id` supersedes (never edits) an earlier one; the
/// aggregation stage resolves the collision with a most-recent-scrape-wins
/// rule keyed on `scrape_run_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Canonical name of the tracked subject (e.g. a show or account).
    pub entity: String,
    /// Event time in UTC.
    pub timestamp: DateTime<Utc>,
    /// Natural identity key, unique within a source. Sources with no stable
    /// id leave this `None`; such records are assumed unique and are never
    /// deduplicated.
    #[serde(default)]
    pub source_record_id: Option<String>,
    /// When the scrape that produced this record ran.
    pub scrape_run_at: DateTime<Utc>,
    /// Named numeric observations (views, likes, interest index, ...).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Opaque pointer to an archived snapshot of the raw response, for audit.
    /// Never interpreted by the pipeline.
    #[serde(default)]
    pub raw_payload_ref: Option<String>,
}

/// One row per (source, entity, week_start) produced by weekly aggregation.
///
/// `week_start` is always the Monday of the ISO week containing the
/// underlying records' timestamps (see [`crate::timebins::floor_to_monday`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub source: String,
    pub entity: String,
    pub week_start: NaiveDate,
    pub values: MetricValues,
    /// When the aggregation run that produced this row executed.
    pub scrape_run_at: DateTime<Utc>,
}

/// One row per (entity, week_start) in the canonical merged panel: the outer
/// join of all sources' weekly aggregates. Columns a source could not supply
/// are `None`, never a fabricated zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPanelRow {
    pub entity: String,
    pub week_start: NaiveDate,
    pub values: MetricValues,
}

impl CanonicalPanelRow {
    /// Value of a column, flattening "column absent" and "column null" into
    /// one `None`.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}
