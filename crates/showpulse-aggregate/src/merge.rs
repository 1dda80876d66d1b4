//! Canonical outer-join merge across sources.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use showpulse_core::{
    CanonicalPanelRow, ColumnSpec, ColumnType, MetricValues, PanelArtifact, SchemaManifest,
    WeeklyAggregate,
};

use crate::error::AggregateError;
use crate::spec::SourceSpec;

/// One source's contribution to a merge run: its declared spec plus either
/// its weekly aggregates or the failure that prevented them.
pub struct SourceBatch {
    pub spec: SourceSpec,
    pub outcome: Result<Vec<WeeklyAggregate>, AggregateError>,
}

impl SourceBatch {
    #[must_use]
    pub fn ok(spec: SourceSpec, rows: Vec<WeeklyAggregate>) -> Self {
        Self {
            spec,
            outcome: Ok(rows),
        }
    }

    #[must_use]
    pub fn failed(spec: SourceSpec, error: AggregateError) -> Self {
        Self {
            spec,
            outcome: Err(error),
        }
    }
}

/// Structured warning for a source that contributed nothing this run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Merge result: the canonical panel plus any per-source failures.
/// Failures are attached, never swallowed — and never fatal to the merge.
pub struct MergeOutcome {
    pub panel: PanelArtifact,
    pub warnings: Vec<SourceFailure>,
}

/// Full outer join of all sources' weekly aggregates on (entity,
/// week_start).
///
/// A row exists for every entity-week observed by any source; columns from
/// sources without data for that key stay null. A failed source contributes
/// all-null columns for the run and a structured warning, and the merge
/// proceeds for the rest. Rows come out sorted by (entity, week_start).
#[must_use]
pub fn merge(batches: Vec<SourceBatch>) -> MergeOutcome {
    let mut manifest_columns = vec![
        ColumnSpec::new("entity", ColumnType::Str, false),
        ColumnSpec::new("week_start", ColumnType::Date, false),
    ];
    for batch in &batches {
        for spec in batch.spec.manifest().columns {
            if spec.name == "entity" || spec.name == "week_start" {
                continue;
            }
            // Panel-level columns are all nullable: any source can be absent
            // for a given entity-week.
            manifest_columns.push(ColumnSpec::new(&spec.name, spec.dtype, true));
        }
    }
    let manifest = SchemaManifest::new(1, manifest_columns);
    let all_columns: Vec<String> = manifest
        .value_columns()
        .into_iter()
        .map(str::to_owned)
        .collect();

    let mut rows: BTreeMap<(String, NaiveDate), MetricValues> = BTreeMap::new();
    let mut warnings = Vec::new();

    for batch in batches {
        match batch.outcome {
            Ok(aggregates) => {
                for aggregate in aggregates {
                    let key = (aggregate.entity, aggregate.week_start);
                    let values = rows.entry(key).or_insert_with(|| {
                        all_columns.iter().map(|c| (c.clone(), None)).collect()
                    });
                    for (column, value) in aggregate.values {
                        values.insert(column, value);
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    source = %batch.spec.source,
                    error = %error,
                    "source contributed nothing to this merge; its columns stay null"
                );
                warnings.push(SourceFailure {
                    source: batch.spec.source.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    let panel_rows: Vec<CanonicalPanelRow> = rows
        .into_iter()
        .map(|((entity, week_start), values)| CanonicalPanelRow {
            entity,
            week_start,
            values,
        })
        .collect();

    tracing::info!(
        rows = panel_rows.len(),
        columns = all_columns.len(),
        warnings = warnings.len(),
        "merged canonical panel"
    );

    MergeOutcome {
        panel: PanelArtifact {
            manifest,
            rows: panel_rows,
        },
        warnings,
    }
}
