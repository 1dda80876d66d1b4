//! Shared data model for the showpulse weekly panel pipeline.
//!
//! Defines the canonical row types flowing between stages (raw records,
//! weekly aggregates, panel rows), the versioned schema manifest that every
//! persisted artifact carries, the single week-floor implementation all
//! sources must share, and the env-driven pipeline configuration.

pub mod artifact;
pub mod config;
pub mod schema;
pub mod timebins;
pub mod types;

pub use artifact::{
    read_json, write_json, write_panel_preview, AggregateArtifact, ArtifactError, PanelArtifact,
};
pub use config::{ConfigError, PipelineConfig};
pub use schema::{ColumnSpec, ColumnType, SchemaManifest, SchemaViolation, SchemaViolations};
pub use timebins::{floor_to_monday, monday_of, week_range};
pub use types::{CanonicalPanelRow, MetricValues, RawRecord, WeeklyAggregate};
