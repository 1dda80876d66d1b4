//! Model-ready feature engineering over the canonical panel.
//!
//! Derives lag, lead, delta, percent-change, rolling and standardized
//! columns per entity time series. Everything is recomputed from the panel
//! on every run; the model-ready table is never a source of truth.

pub mod build;
pub mod spec;

pub use build::{build_model_ready, ModelReadyArtifact, ModelReadyRow};
pub use spec::{feature_columns, FeatureSpec};
