//! Declared per-source aggregation specs.
//!
//! Each source declares, at pipeline-design time, the weekly columns it
//! produces and how each is computed from raw records. The spec doubles as
//! the source of the schema manifest its batches are validated against.

use serde::{Deserialize, Serialize};
use showpulse_core::{ColumnSpec, ColumnType, SchemaManifest};

/// How one output column is computed over a week's deduplicated records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AggregateOp {
    /// Number of surviving records in the bucket.
    Count,
    /// Sum of a named metric over records that carry it; null when none do.
    Sum { metric: String },
    /// Mean of a named metric over records that carry it; null when none do.
    Mean { metric: String },
    /// Number of distinct calendar days with at least one record.
    DistinctDays,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    #[serde(flatten)]
    pub op: AggregateOp,
}

impl OutputColumn {
    #[must_use]
    pub fn new(name: &str, op: AggregateOp) -> Self {
        Self {
            name: name.to_owned(),
            op,
        }
    }
}

/// One source's declared weekly output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub source: String,
    pub columns: Vec<OutputColumn>,
}

impl SourceSpec {
    #[must_use]
    pub fn new(source: &str, columns: Vec<OutputColumn>) -> Self {
        Self {
            source: source.to_owned(),
            columns,
        }
    }

    /// Schema manifest for this source's weekly aggregates.
    ///
    /// Count and distinct-day columns are non-nullable integers (a bucket
    /// always has a count); sums and means are nullable floats because a
    /// bucket may contain no record carrying the metric.
    #[must_use]
    pub fn manifest(&self) -> SchemaManifest {
        let mut columns = vec![
            ColumnSpec::new("entity", ColumnType::Str, false),
            ColumnSpec::new("week_start", ColumnType::Date, false),
        ];
        for output in &self.columns {
            let (dtype, nullable) = match output.op {
                AggregateOp::Count | AggregateOp::DistinctDays => (ColumnType::Int, false),
                AggregateOp::Sum { .. } | AggregateOp::Mean { .. } => (ColumnType::Float, true),
            };
            columns.push(ColumnSpec::new(&output.name, dtype, nullable));
        }
        SchemaManifest::new(1, columns)
    }

    /// Names of this source's metric columns, in declared order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
