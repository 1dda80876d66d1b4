//! Quality report types and summary rendering.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ACTION_NEEDED")]
    ActionNeeded,
}

/// Non-null share for one panel column, attributed to its source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageMetric {
    pub source: String,
    pub column: String,
    pub non_null: usize,
    pub total: usize,
    pub ratio: f64,
    /// Advisory only; never escalates the report status.
    pub low_coverage: bool,
}

/// A fatal row-key problem: the panel cannot be trusted downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampIssue {
    pub entity: String,
    pub week_start: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Spike,
    Drop,
}

/// One value far outside its entity's recent history for a metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub entity: String,
    pub week_start: NaiveDate,
    pub metric: String,
    pub value: f64,
    pub trailing_median: f64,
    /// value / trailing_median.
    pub ratio: f64,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub row_count: usize,
    pub column_count: usize,
    pub schema_valid: bool,
    pub schema_errors: Vec<String>,
    pub coverage: Vec<CoverageMetric>,
    pub timestamp_issues: Vec<TimestampIssue>,
    pub anomalies: Vec<Anomaly>,
    pub status: QualityStatus,
}

/// Human-readable one-screen summary of a report.
#[must_use]
pub fn render_summary(report: &QualityReport) -> String {
    let mut out = String::new();
    let status = match report.status {
        QualityStatus::Ok => "OK",
        QualityStatus::ActionNeeded => "ACTION_NEEDED",
    };
    out.push_str(&format!(
        "panel quality: {status} ({} rows, {} columns)\n",
        report.row_count, report.column_count
    ));

    if !report.schema_valid {
        out.push_str(&format!("schema errors ({}):\n", report.schema_errors.len()));
        for error in &report.schema_errors {
            out.push_str(&format!("  {error}\n"));
        }
    }

    for issue in &report.timestamp_issues {
        out.push_str(&format!(
            "timestamp issue: {} / {}: {}\n",
            issue.entity, issue.week_start, issue.reason
        ));
    }

    let low: Vec<&CoverageMetric> = report.coverage.iter().filter(|c| c.low_coverage).collect();
    if low.is_empty() {
        out.push_str("coverage: all columns above floor\n");
    } else {
        for metric in low {
            out.push_str(&format!(
                "low coverage: {}/{} at {:.0}% ({}/{} non-null)\n",
                metric.source,
                metric.column,
                metric.ratio * 100.0,
                metric.non_null,
                metric.total
            ));
        }
    }

    if report.anomalies.is_empty() {
        out.push_str("anomalies: none\n");
    } else {
        for anomaly in &report.anomalies {
            let kind = match anomaly.kind {
                AnomalyKind::Spike => "spike",
                AnomalyKind::Drop => "drop",
            };
            out.push_str(&format!(
                "{kind}: {} / {} / {} = {} ({:.1}x trailing median {})\n",
                anomaly.entity,
                anomaly.week_start,
                anomaly.metric,
                anomaly.value,
                anomaly.ratio,
                anomaly.trailing_median
            ));
        }
    }
    out
}
