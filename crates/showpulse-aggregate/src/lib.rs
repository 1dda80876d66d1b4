//! Weekly aggregation and canonical merge.
//!
//! Converts heterogeneous per-record datasets into per-source weekly
//! aggregates under declared source specs, then outer-joins all sources into
//! one canonical panel keyed by (entity, week_start). Schema enforcement is
//! wholesale per batch; a single source's failure never aborts the merge for
//! the others.

pub mod error;
pub mod merge;
pub mod spec;
pub mod weekly;

pub use error::AggregateError;
pub use merge::{merge, MergeOutcome, SourceBatch, SourceFailure};
pub use spec::{AggregateOp, OutputColumn, SourceSpec};
pub use weekly::{aggregate, dedupe_records};
