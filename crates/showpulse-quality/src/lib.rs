//! Panel quality checks.
//!
//! Evaluates the canonical panel before it is handed to feature engineering:
//! schema conformance and timestamp integrity are fatal, coverage and
//! anomaly findings are advisory. The report carries everything found;
//! callers decide whether to block on it.

pub mod checks;
pub mod report;

pub use checks::{evaluate, QualityThresholds};
pub use report::{
    render_summary, Anomaly, AnomalyKind, CoverageMetric, QualityReport, QualityStatus,
    TimestampIssue,
};
