//! Feature configuration and deterministic column naming.

use serde::{Deserialize, Serialize};

/// Which base metrics get derived columns, and at which offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Panel columns to derive features from.
    pub base_metrics: Vec<String>,
    /// Trailing offsets, in weeks.
    #[serde(default = "default_lags")]
    pub lags: Vec<usize>,
    /// Forward offsets, in weeks. Leads are placebo features: computed with
    /// the same windowing as lags so downstream asymmetry is attributable to
    /// the data, never to construction.
    #[serde(default = "default_leads")]
    pub leads: Vec<usize>,
    /// Trailing rolling-window width, in weeks.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
}

fn default_lags() -> Vec<usize> {
    vec![1, 2, 4, 6]
}

fn default_leads() -> Vec<usize> {
    vec![4]
}

fn default_rolling_window() -> usize {
    3
}

impl FeatureSpec {
    #[must_use]
    pub fn new(base_metrics: Vec<String>) -> Self {
        Self {
            base_metrics,
            lags: default_lags(),
            leads: default_leads(),
            rolling_window: default_rolling_window(),
        }
    }
}

/// Every derived column name this spec will produce, in a stable order.
/// Consumers discover features from this list, never by convention.
#[must_use]
pub fn feature_columns(spec: &FeatureSpec) -> Vec<String> {
    let mut columns = Vec::new();
    for base in &spec.base_metrics {
        for k in &spec.lags {
            columns.push(format!("{base}_lag{k}"));
        }
        for k in &spec.leads {
            columns.push(format!("{base}_lead{k}"));
        }
        columns.push(format!("{base}_delta"));
        columns.push(format!("{base}_pct_change"));
        columns.push(format!("{base}_roll{}_sum", spec.rolling_window));
        columns.push(format!("{base}_roll{}_mean", spec.rolling_window));
        columns.push(format!("{base}_z"));
        for k in &spec.lags {
            columns.push(format!("{base}_lag{k}_z"));
        }
    }
    columns
}
