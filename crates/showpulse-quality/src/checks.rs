//! Check implementations behind [`evaluate`].

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, Utc};
use showpulse_core::{monday_of, CanonicalPanelRow, PanelArtifact};

use crate::report::{
    Anomaly, AnomalyKind, CoverageMetric, QualityReport, QualityStatus, TimestampIssue,
};

/// Tunable thresholds for the advisory checks.
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    /// Flag coverage below this non-null share.
    pub coverage_floor: f64,
    /// Spike above `threshold * median`, drop below `median / threshold`.
    pub anomaly_threshold: f64,
    /// Weeks of trailing history consulted per value.
    pub lookback_weeks: usize,
    /// Minimum non-null observations in the window before judging.
    pub min_observations: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            coverage_floor: 0.60,
            anomaly_threshold: 5.0,
            lookback_weeks: 8,
            min_observations: 3,
        }
    }
}

/// Run every check over the panel and assemble the report.
///
/// `source_columns` attributes each panel column to the source that produced
/// it, for coverage reporting. Schema and timestamp violations set
/// `ACTION_NEEDED`; coverage and anomaly findings never do.
#[must_use]
pub fn evaluate(
    panel: &PanelArtifact,
    source_columns: &[(String, Vec<String>)],
    thresholds: &QualityThresholds,
) -> QualityReport {
    let schema_errors = match panel.manifest.validate_panel(&panel.rows) {
        Ok(()) => Vec::new(),
        Err(violations) => violations
            .violations
            .iter()
            .map(|v| format!("row {} column {}: {}", v.row, v.column, v.reason))
            .collect(),
    };
    let schema_valid = schema_errors.is_empty();

    let coverage = coverage_metrics(&panel.rows, source_columns, thresholds.coverage_floor);
    let timestamp_issues = timestamp_integrity(&panel.rows);
    let anomalies = detect_anomalies(panel, thresholds);

    let status = if schema_valid && timestamp_issues.is_empty() {
        QualityStatus::Ok
    } else {
        QualityStatus::ActionNeeded
    };
    if status == QualityStatus::ActionNeeded {
        tracing::warn!(
            schema_errors = schema_errors.len(),
            timestamp_issues = timestamp_issues.len(),
            "panel needs action before downstream use"
        );
    }

    QualityReport {
        generated_at: Utc::now(),
        row_count: panel.rows.len(),
        column_count: panel.manifest.columns.len(),
        schema_valid,
        schema_errors,
        coverage,
        timestamp_issues,
        anomalies,
        status,
    }
}

fn coverage_metrics(
    rows: &[CanonicalPanelRow],
    source_columns: &[(String, Vec<String>)],
    floor: f64,
) -> Vec<CoverageMetric> {
    let total = rows.len();
    let mut metrics = Vec::new();
    for (source, columns) in source_columns {
        for column in columns {
            let non_null = rows.iter().filter(|r| r.value(column).is_some()).count();
            #[allow(clippy::cast_precision_loss)]
            let ratio = if total == 0 {
                0.0
            } else {
                non_null as f64 / total as f64
            };
            metrics.push(CoverageMetric {
                source: source.clone(),
                column: column.clone(),
                non_null,
                total,
                ratio,
                low_coverage: ratio < floor,
            });
        }
    }
    metrics
}

fn timestamp_integrity(rows: &[CanonicalPanelRow]) -> Vec<TimestampIssue> {
    let mut issues = Vec::new();
    let mut seen: HashSet<(&str, NaiveDate)> = HashSet::new();
    let mut last_per_entity: BTreeMap<&str, NaiveDate> = BTreeMap::new();

    for row in rows {
        if row.week_start != monday_of(row.week_start) {
            issues.push(TimestampIssue {
                entity: row.entity.clone(),
                week_start: row.week_start,
                reason: "week_start is not a Monday".to_owned(),
            });
        }
        if !seen.insert((row.entity.as_str(), row.week_start)) {
            issues.push(TimestampIssue {
                entity: row.entity.clone(),
                week_start: row.week_start,
                reason: "duplicate (entity, week_start) key".to_owned(),
            });
        }
        if let Some(last) = last_per_entity.get(row.entity.as_str()) {
            if row.week_start <= *last {
                issues.push(TimestampIssue {
                    entity: row.entity.clone(),
                    week_start: row.week_start,
                    reason: format!("weeks out of order (follows {last})"),
                });
            }
        }
        last_per_entity.insert(row.entity.as_str(), row.week_start);
    }
    issues
}

/// Flag values far outside their entity's recent history.
///
/// For each (entity, metric), each non-null value is compared to the median
/// of the trailing window of prior weeks (nulls excluded). The window must
/// hold at least `min_observations` values and a positive median before any
/// judgement is made.
fn detect_anomalies(panel: &PanelArtifact, thresholds: &QualityThresholds) -> Vec<Anomaly> {
    let mut by_entity: BTreeMap<&str, Vec<&CanonicalPanelRow>> = BTreeMap::new();
    for row in &panel.rows {
        by_entity.entry(row.entity.as_str()).or_default().push(row);
    }

    let mut anomalies = Vec::new();
    for metric in panel.manifest.value_columns() {
        for rows in by_entity.values() {
            let mut rows = rows.clone();
            rows.sort_by_key(|r| r.week_start);
            let series: Vec<(NaiveDate, Option<f64>)> =
                rows.iter().map(|r| (r.week_start, r.value(metric))).collect();

            for (i, (week_start, value)) in series.iter().enumerate() {
                let Some(value) = *value else { continue };
                let window_from = i.saturating_sub(thresholds.lookback_weeks);
                let window: Vec<f64> = series[window_from..i]
                    .iter()
                    .filter_map(|(_, v)| *v)
                    .collect();
                if window.len() < thresholds.min_observations {
                    continue;
                }
                let trailing_median = median(&window);
                if trailing_median <= 0.0 {
                    continue;
                }
                let ratio = value / trailing_median;
                // Zero weeks are a coverage concern, not a drop.
                let kind = if value > thresholds.anomaly_threshold * trailing_median {
                    AnomalyKind::Spike
                } else if value > 0.0 && value < trailing_median / thresholds.anomaly_threshold {
                    AnomalyKind::Drop
                } else {
                    continue;
                };
                anomalies.push(Anomaly {
                    entity: rows[i].entity.clone(),
                    week_start: *week_start,
                    metric: metric.to_owned(),
                    value,
                    trailing_median,
                    ratio,
                    kind,
                });
            }
        }
    }
    anomalies
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showpulse_core::{ColumnSpec, ColumnType, SchemaManifest};
    use std::collections::BTreeMap;

    fn manifest() -> SchemaManifest {
        SchemaManifest::new(
            1,
            vec![
                ColumnSpec::new("entity", ColumnType::Str, false),
                ColumnSpec::new("week_start", ColumnType::Date, false),
                ColumnSpec::new("views", ColumnType::Float, true),
            ],
        )
    }

    fn row(entity: &str, week: NaiveDate, views: Option<f64>) -> CanonicalPanelRow {
        CanonicalPanelRow {
            entity: entity.to_owned(),
            week_start: week,
            values: BTreeMap::from([("views".to_owned(), views)]),
        }
    }

    fn week(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::weeks(i64::try_from(n).unwrap())
    }

    fn panel(rows: Vec<CanonicalPanelRow>) -> PanelArtifact {
        PanelArtifact {
            manifest: manifest(),
            rows,
        }
    }

    fn sources() -> Vec<(String, Vec<String>)> {
        vec![("tiktok".to_owned(), vec!["views".to_owned()])]
    }

    #[test]
    fn clean_panel_reports_ok() {
        let report = evaluate(
            &panel(vec![
                row("Oh Mary!", week(0), Some(10.0)),
                row("Oh Mary!", week(1), Some(12.0)),
            ]),
            &sources(),
            &QualityThresholds::default(),
        );
        assert_eq!(report.status, QualityStatus::Ok);
        assert!(report.schema_valid);
        assert!(report.timestamp_issues.is_empty());
        assert!(report.anomalies.is_empty());
        assert!(!report.coverage[0].low_coverage);
    }

    #[test]
    fn low_coverage_is_advisory_not_action_needed() {
        // 1 of 4 weeks non-null: 25%, well under the 60% floor.
        let report = evaluate(
            &panel(vec![
                row("Oh Mary!", week(0), Some(10.0)),
                row("Oh Mary!", week(1), None),
                row("Oh Mary!", week(2), None),
                row("Oh Mary!", week(3), None),
            ]),
            &sources(),
            &QualityThresholds::default(),
        );
        assert!(report.coverage[0].low_coverage);
        assert_eq!(report.status, QualityStatus::Ok);
    }

    #[test]
    fn non_monday_week_needs_action() {
        let tuesday = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let report = evaluate(
            &panel(vec![row("Oh Mary!", tuesday, Some(1.0))]),
            &sources(),
            &QualityThresholds::default(),
        );
        assert_eq!(report.status, QualityStatus::ActionNeeded);
        assert!(report.timestamp_issues[0].reason.contains("Monday"));
    }

    #[test]
    fn duplicate_entity_week_needs_action() {
        let report = evaluate(
            &panel(vec![
                row("Oh Mary!", week(0), Some(1.0)),
                row("Oh Mary!", week(0), Some(2.0)),
            ]),
            &sources(),
            &QualityThresholds::default(),
        );
        assert_eq!(report.status, QualityStatus::ActionNeeded);
        assert!(report
            .timestamp_issues
            .iter()
            .any(|i| i.reason.contains("duplicate")));
    }

    #[test]
    fn six_times_median_flags_exactly_one_spike() {
        let mut rows: Vec<CanonicalPanelRow> =
            (0..6).map(|n| row("Oh Mary!", week(n), Some(100.0))).collect();
        rows.push(row("Oh Mary!", week(6), Some(600.0)));
        let report = evaluate(&panel(rows), &sources(), &QualityThresholds::default());
        assert_eq!(report.anomalies.len(), 1);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::Spike);
        assert_eq!(anomaly.week_start, week(6));
        assert!((anomaly.trailing_median - 100.0).abs() < f64::EPSILON);
        assert!((anomaly.ratio - 6.0).abs() < f64::EPSILON);
        assert_eq!(report.status, QualityStatus::Ok);
    }

    #[test]
    fn collapse_to_near_zero_flags_a_drop() {
        let mut rows: Vec<CanonicalPanelRow> =
            (0..5).map(|n| row("Oh Mary!", week(n), Some(100.0))).collect();
        rows.push(row("Oh Mary!", week(5), Some(10.0)));
        let report = evaluate(&panel(rows), &sources(), &QualityThresholds::default());
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::Drop);
    }

    #[test]
    fn zero_value_is_not_flagged_as_a_drop() {
        let mut rows: Vec<CanonicalPanelRow> =
            (0..5).map(|n| row("Oh Mary!", week(n), Some(100.0))).collect();
        rows.push(row("Oh Mary!", week(5), Some(0.0)));
        let report = evaluate(&panel(rows), &sources(), &QualityThresholds::default());
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn too_little_history_is_never_judged() {
        // Only two prior observations: below the three-observation minimum.
        let report = evaluate(
            &panel(vec![
                row("Oh Mary!", week(0), Some(100.0)),
                row("Oh Mary!", week(1), Some(100.0)),
                row("Oh Mary!", week(2), Some(900.0)),
            ]),
            &sources(),
            &QualityThresholds::default(),
        );
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn zero_median_history_is_skipped() {
        let mut rows: Vec<CanonicalPanelRow> =
            (0..5).map(|n| row("Oh Mary!", week(n), Some(0.0))).collect();
        rows.push(row("Oh Mary!", week(5), Some(50.0)));
        let report = evaluate(&panel(rows), &sources(), &QualityThresholds::default());
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn nulls_are_excluded_from_the_trailing_window() {
        // Three non-null among five prior weeks: still enough to judge.
        let rows = vec![
            row("Oh Mary!", week(0), Some(100.0)),
            row("Oh Mary!", week(1), None),
            row("Oh Mary!", week(2), Some(100.0)),
            row("Oh Mary!", week(3), None),
            row("Oh Mary!", week(4), Some(100.0)),
            row("Oh Mary!", week(5), Some(600.0)),
        ];
        let report = evaluate(&panel(rows), &sources(), &QualityThresholds::default());
        assert_eq!(report.anomalies.len(), 1);
    }

    #[test]
    fn status_serializes_in_screaming_case() {
        let report = evaluate(&panel(vec![]), &sources(), &QualityThresholds::default());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\": \"OK\"") || json.contains("\"status\":\"OK\""));
    }

    #[test]
    fn summary_mentions_low_coverage_columns() {
        let report = evaluate(
            &panel(vec![
                row("Oh Mary!", week(0), Some(1.0)),
                row("Oh Mary!", week(1), None),
                row("Oh Mary!", week(2), None),
            ]),
            &sources(),
            &QualityThresholds::default(),
        );
        let summary = crate::report::render_summary(&report);
        assert!(summary.contains("low coverage"));
        assert!(summary.contains("tiktok/views"));
        assert!(summary.starts_with("panel quality: OK"));
    }
}
