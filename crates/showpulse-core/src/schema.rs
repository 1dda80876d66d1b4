//! Canonical schema manifests.
//!
//! Source payloads arrive in different shapes; the schema boundary is an
//! explicit, versioned manifest of typed column descriptors checked when a
//! batch enters the aggregation layer. Validation rejects a batch wholesale
//! with every violation listed — a bad batch is never coerced or thinned
//! row-by-row, because partial silent data loss is worse than a loud failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CanonicalPanelRow, MetricValues, WeeklyAggregate};

/// Columns reserved for the row key; always present as typed struct fields,
/// never carried in the `values` map.
pub const KEY_COLUMNS: [&str; 2] = ["entity", "week_start"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Whole-number counts and sums.
    Int,
    /// Continuous values (indices, means).
    Float,
    /// Flags, stored as 0.0 / 1.0.
    Bool,
    /// Row-key text column (entity).
    Str,
    /// Row-key date column (week_start).
    Date,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: &str, dtype: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.to_owned(),
            dtype,
            nullable,
        }
    }
}

/// Versioned list of typed column descriptors. Travels alongside every
/// persisted aggregate and panel so readers can validate without out-of-band
/// knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaManifest {
    pub version: u32,
    pub columns: Vec<ColumnSpec>,
}

/// One failed check for one (row, column).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub row: usize,
    pub column: String,
    pub reason: String,
}

/// Batch-level rejection carrying the full set of violations, so the caller
/// sees everything wrong in one report.
#[derive(Debug, Clone, Error)]
#[error("schema validation failed with {} violation(s): {}", .violations.len(), summarize(.violations))]
pub struct SchemaViolations {
    pub violations: Vec<SchemaViolation>,
}

fn summarize(violations: &[SchemaViolation]) -> String {
    const SHOWN: usize = 5;
    let mut parts: Vec<String> = violations
        .iter()
        .take(SHOWN)
        .map(|v| format!("row {} column {}: {}", v.row, v.column, v.reason))
        .collect();
    if violations.len() > SHOWN {
        parts.push(format!("... and {} more", violations.len() - SHOWN));
    }
    parts.join("; ")
}

impl SchemaManifest {
    #[must_use]
    pub fn new(version: u32, columns: Vec<ColumnSpec>) -> Self {
        Self { version, columns }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the value (non-key) columns, in manifest order.
    #[must_use]
    pub fn value_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !KEY_COLUMNS.contains(&c.name.as_str()))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Validate a batch of weekly aggregates against this manifest.
    ///
    /// Checked per row: no unexpected column names, no null (or missing)
    /// value in a non-nullable column, and every present value fits its
    /// declared type. Non-finite numbers are always rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolations`] listing every violation in the batch.
    pub fn validate_batch(&self, batch: &[WeeklyAggregate]) -> Result<(), SchemaViolations> {
        let mut violations = Vec::new();
        for (row, aggregate) in batch.iter().enumerate() {
            self.validate_row(row, &aggregate.values, &mut violations);
        }
        finish(violations)
    }

    /// Validate canonical panel rows against this manifest. Same per-cell
    /// checks as [`Self::validate_batch`], applied to the merged panel.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolations`] listing every violation in the panel.
    pub fn validate_panel(&self, rows: &[CanonicalPanelRow]) -> Result<(), SchemaViolations> {
        let mut violations = Vec::new();
        for (row, panel_row) in rows.iter().enumerate() {
            self.validate_row(row, &panel_row.values, &mut violations);
        }
        finish(violations)
    }

    /// The per-cell checks shared by batch and panel validation.
    fn validate_row(&self, row: usize, values: &MetricValues, violations: &mut Vec<SchemaViolation>) {
        for name in values.keys() {
            if self.column(name).is_none() {
                violations.push(SchemaViolation {
                    row,
                    column: name.clone(),
                    reason: "unexpected column not in manifest".to_owned(),
                });
            }
        }

        for spec in &self.columns {
            if KEY_COLUMNS.contains(&spec.name.as_str()) {
                continue;
            }
            match values.get(&spec.name).copied().flatten() {
                None => {
                    if !spec.nullable {
                        violations.push(SchemaViolation {
                            row,
                            column: spec.name.clone(),
                            reason: "null in non-nullable column".to_owned(),
                        });
                    }
                }
                Some(value) => {
                    if let Some(reason) = type_mismatch(spec.dtype, value) {
                        violations.push(SchemaViolation {
                            row,
                            column: spec.name.clone(),
                            reason,
                        });
                    }
                }
            }
        }
    }
}

fn finish(violations: Vec<SchemaViolation>) -> Result<(), SchemaViolations> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaViolations { violations })
    }
}

fn type_mismatch(dtype: ColumnType, value: f64) -> Option<String> {
    if !value.is_finite() {
        return Some(format!("non-finite value {value}"));
    }
    match dtype {
        ColumnType::Int if value.fract() != 0.0 => {
            Some(format!("expected integer, got {value}"))
        }
        ColumnType::Bool if value != 0.0 && value != 1.0 => {
            Some(format!("expected 0/1 flag, got {value}"))
        }
        ColumnType::Str | ColumnType::Date => {
            Some("key column must not appear in values".to_owned())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn manifest() -> SchemaManifest {
        SchemaManifest::new(
            1,
            vec![
                ColumnSpec::new("entity", ColumnType::Str, false),
                ColumnSpec::new("week_start", ColumnType::Date, false),
                ColumnSpec::new("tt_posts", ColumnType::Int, false),
                ColumnSpec::new("tt_sum_views", ColumnType::Float, true),
            ],
        )
    }

    fn aggregate(values: &[(&str, Option<f64>)]) -> WeeklyAggregate {
        WeeklyAggregate {
            source: "tiktok".to_owned(),
            entity: "Oh Mary!".to_owned(),
            week_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            values: values
                .iter()
                .map(|(k, v)| ((*k).to_owned(), *v))
                .collect::<BTreeMap<_, _>>(),
            scrape_run_at: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn valid_batch_passes() {
        let batch = vec![aggregate(&[
            ("tt_posts", Some(3.0)),
            ("tt_sum_views", Some(1250.5)),
        ])];
        assert!(manifest().validate_batch(&batch).is_ok());
    }

    #[test]
    fn nullable_column_may_be_null_or_absent() {
        let batch = vec![
            aggregate(&[("tt_posts", Some(1.0)), ("tt_sum_views", None)]),
            aggregate(&[("tt_posts", Some(2.0))]),
        ];
        assert!(manifest().validate_batch(&batch).is_ok());
    }

    #[test]
    fn unexpected_column_is_rejected() {
        let batch = vec![aggregate(&[("tt_posts", Some(1.0)), ("bogus", Some(9.0))])];
        let err = manifest().validate_batch(&batch).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].column, "bogus");
    }

    #[test]
    fn null_in_non_nullable_column_is_rejected() {
        let batch = vec![aggregate(&[("tt_posts", None)])];
        let err = manifest().validate_batch(&batch).unwrap_err();
        assert!(err.violations[0].reason.contains("non-nullable"));
    }

    #[test]
    fn fractional_int_is_rejected() {
        let batch = vec![aggregate(&[("tt_posts", Some(1.5))])];
        let err = manifest().validate_batch(&batch).unwrap_err();
        assert!(err.violations[0].reason.contains("integer"));
    }

    #[test]
    fn all_violations_reported_at_once() {
        let batch = vec![
            aggregate(&[("tt_posts", None), ("bogus", Some(1.0))]),
            aggregate(&[("tt_posts", Some(0.5))]),
        ];
        let err = manifest().validate_batch(&batch).unwrap_err();
        assert_eq!(err.violations.len(), 3);
    }

    #[test]
    fn panel_rows_get_the_same_cell_checks() {
        let row = CanonicalPanelRow {
            entity: "Oh Mary!".to_owned(),
            week_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            values: BTreeMap::from([
                ("bogus".to_owned(), Some(1.0)),
                ("tt_posts".to_owned(), Some(0.5)),
            ]),
        };
        let err = manifest().validate_panel(&[row]).unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert!(err.violations.iter().any(|v| v.column == "bogus"));
        assert!(err
            .violations
            .iter()
            .any(|v| v.column == "tt_posts" && v.reason.contains("integer")));
    }

    #[test]
    fn non_finite_value_is_rejected() {
        let batch = vec![aggregate(&[
            ("tt_posts", Some(1.0)),
            ("tt_sum_views", Some(f64::INFINITY)),
        ])];
        assert!(manifest().validate_batch(&batch).is_err());
    }
}
