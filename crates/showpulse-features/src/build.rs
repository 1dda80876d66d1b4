//! Feature construction over per-entity time series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use showpulse_core::{MetricValues, PanelArtifact};

use crate::spec::{feature_columns, FeatureSpec};

/// One panel row plus its derived feature columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReadyRow {
    pub entity: String,
    pub week_start: NaiveDate,
    pub values: MetricValues,
}

impl ModelReadyRow {
    #[must_use]
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

/// The model-ready table with its full (panel + derived) column list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReadyArtifact {
    pub columns: Vec<String>,
    pub rows: Vec<ModelReadyRow>,
}

/// Derive the model-ready table from the canonical panel.
///
/// Each entity's rows are treated as a series sorted by `week_start`; lags,
/// leads, deltas, percent changes and rolling stats are computed within that
/// series only. Z-scores standardize base metrics and their lags against
/// the whole table. Missing inputs propagate as null; nothing is imputed.
#[must_use]
pub fn build_model_ready(panel: &PanelArtifact, spec: &FeatureSpec) -> ModelReadyArtifact {
    let mut rows: Vec<ModelReadyRow> = panel
        .rows
        .iter()
        .map(|r| ModelReadyRow {
            entity: r.entity.clone(),
            week_start: r.week_start,
            values: r.values.clone(),
        })
        .collect();
    rows.sort_by(|a, b| (a.entity.as_str(), a.week_start).cmp(&(b.entity.as_str(), b.week_start)));

    // Contiguous index ranges per entity, in sorted order.
    let mut entity_ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        if i == rows.len() || rows[i].entity != rows[start].entity {
            entity_ranges.push((start, i));
            start = i;
        }
    }

    for base in &spec.base_metrics {
        for &(lo, hi) in &entity_ranges {
            let series: Vec<Option<f64>> = rows[lo..hi].iter().map(|r| r.value(base)).collect();

            for (offset, row) in rows[lo..hi].iter_mut().enumerate() {
                for &k in &spec.lags {
                    let value = offset.checked_sub(k).and_then(|i| series[i]);
                    row.values.insert(format!("{base}_lag{k}"), value);
                }
                for &k in &spec.leads {
                    let value = series.get(offset + k).copied().flatten();
                    row.values.insert(format!("{base}_lead{k}"), value);
                }

                let previous = offset.checked_sub(1).and_then(|i| series[i]);
                let delta = match (series[offset], previous) {
                    (Some(current), Some(prev)) => Some(current - prev),
                    _ => None,
                };
                row.values.insert(format!("{base}_delta"), delta);
                let pct = match (delta, previous) {
                    (Some(d), Some(prev)) if prev != 0.0 => Some(d / prev),
                    _ => None,
                };
                row.values.insert(format!("{base}_pct_change"), pct);

                let w = spec.rolling_window;
                let full: Option<Vec<f64>> = (offset + 1 >= w).then(|| {
                    series[offset + 1 - w..=offset]
                        .iter()
                        .copied()
                        .collect::<Option<Vec<f64>>>()
                }).flatten();
                let (roll_sum, roll_mean) = match full {
                    Some(values) => {
                        let sum: f64 = values.iter().sum();
                        #[allow(clippy::cast_precision_loss)]
                        let mean = sum / values.len() as f64;
                        (Some(sum), Some(mean))
                    }
                    None => (None, None),
                };
                row.values.insert(format!("{base}_roll{w}_sum"), roll_sum);
                row.values.insert(format!("{base}_roll{w}_mean"), roll_mean);
            }
        }
    }

    // Global standardization runs after every lag column exists.
    for base in &spec.base_metrics {
        let mut targets = vec![base.clone()];
        targets.extend(spec.lags.iter().map(|k| format!("{base}_lag{k}")));
        for column in targets {
            standardize(&mut rows, &column);
        }
    }

    let mut columns: Vec<String> = panel
        .manifest
        .value_columns()
        .into_iter()
        .map(str::to_owned)
        .collect();
    columns.extend(feature_columns(spec));

    tracing::info!(
        rows = rows.len(),
        derived = feature_columns(spec).len(),
        "built model-ready table"
    );
    ModelReadyArtifact { columns, rows }
}

/// Add `{column}_z` from the global mean and sample stddev of `column`.
/// Null when the input is null, fewer than two values exist, or the stddev
/// is zero.
fn standardize(rows: &mut [ModelReadyRow], column: &str) {
    let values: Vec<f64> = rows.iter().filter_map(|r| r.value(column)).collect();
    let stats = moments(&values);
    let name = format!("{column}_z");
    for row in rows.iter_mut() {
        let z = match (row.value(column), stats) {
            (Some(v), Some((mean, stddev))) => Some((v - mean) / stddev),
            _ => None,
        };
        row.values.insert(name.clone(), z);
    }
}

#[allow(clippy::cast_precision_loss)]
fn moments(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        None
    } else {
        Some((mean, stddev))
    }
}
