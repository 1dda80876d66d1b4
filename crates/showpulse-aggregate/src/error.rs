use showpulse_core::SchemaViolations;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    /// The whole batch was rejected; every violation is listed. Nothing from
    /// a rejected batch reaches the panel.
    #[error(transparent)]
    Schema(#[from] SchemaViolations),

    /// The source's aggregate artifact could not be produced or read, so its
    /// columns will be entirely null for this run.
    #[error("aggregate unavailable for source {source_name}: {reason}")]
    Unavailable { source_name: String, reason: String },
}
