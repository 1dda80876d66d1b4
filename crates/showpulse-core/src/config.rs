//! Pipeline configuration from environment variables.
//!
//! Every operational constant the pipeline uses — anomaly and coverage
//! thresholds, backoff parameters, snapshot retention — is configuration,
//! not a hard-coded invariant. Defaults match the values the pipeline has
//! been operated with, but nothing downstream assumes them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for persisted artifacts and snapshots.
    pub data_dir: PathBuf,
    /// Identifying signature sent with every fetch.
    pub user_agent: String,
    /// Per-request timeout, seconds.
    pub fetch_timeout_secs: u64,
    /// Total attempts per URL (first try included).
    pub fetch_max_attempts: u32,
    /// Base delay for exponential backoff, milliseconds.
    pub fetch_backoff_base_ms: u64,
    /// Minimum delay between requests to the same host, milliseconds.
    pub fetch_min_delay_ms: u64,
    /// Robots policy cache time-to-live, seconds.
    pub robots_ttl_secs: u64,
    /// Snapshots retained per identifier before the oldest is evicted.
    pub snapshot_cap: usize,
    /// Anomaly flag threshold: current value vs trailing median multiple.
    pub anomaly_threshold: f64,
    /// Trailing window for the anomaly baseline, weeks.
    pub anomaly_lookback_weeks: usize,
    /// Minimum non-null observations in the window before flagging.
    pub anomaly_min_observations: usize,
    /// Coverage fraction below which a source/metric is flagged LOW_COVERAGE.
    pub coverage_floor: f64,
    /// Trailing window for rolling feature stats, weeks.
    pub rolling_window: usize,
    /// Rows included in the human-readable panel preview.
    pub preview_rows: usize,
}

const DEFAULT_USER_AGENT: &str =
    "showpulse/0.1 (+https://github.com/research/showpulse; research crawler)";

impl PipelineConfig {
    /// Load configuration, reading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any set env var fails to parse.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from process env vars only (no `.env`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any set env var fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(|key| std::env::var(key).ok())
    }

    /// Core parsing logic, decoupled from the real environment so tests can
    /// drive it with a plain map lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a provided value fails to parse.
    pub fn build<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            var: &str,
            default: T,
        ) -> Result<T, ConfigError>
        where
            T::Err: std::fmt::Display,
        {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
                    var: var.to_owned(),
                    reason: e.to_string(),
                }),
            }
        }

        Ok(Self {
            data_dir: PathBuf::from(
                lookup("SHOWPULSE_DATA_DIR").unwrap_or_else(|| "data".to_owned()),
            ),
            user_agent: lookup("SHOWPULSE_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            fetch_timeout_secs: parse(&lookup, "SHOWPULSE_FETCH_TIMEOUT_SECS", 30)?,
            fetch_max_attempts: parse(&lookup, "SHOWPULSE_FETCH_MAX_ATTEMPTS", 4)?,
            fetch_backoff_base_ms: parse(&lookup, "SHOWPULSE_FETCH_BACKOFF_BASE_MS", 2_000)?,
            fetch_min_delay_ms: parse(&lookup, "SHOWPULSE_FETCH_MIN_DELAY_MS", 2_000)?,
            robots_ttl_secs: parse(&lookup, "SHOWPULSE_ROBOTS_TTL_SECS", 3_600)?,
            snapshot_cap: parse(&lookup, "SHOWPULSE_SNAPSHOT_CAP", 50)?,
            anomaly_threshold: parse(&lookup, "SHOWPULSE_ANOMALY_THRESHOLD", 5.0)?,
            anomaly_lookback_weeks: parse(&lookup, "SHOWPULSE_ANOMALY_LOOKBACK_WEEKS", 8)?,
            anomaly_min_observations: parse(&lookup, "SHOWPULSE_ANOMALY_MIN_OBS", 3)?,
            coverage_floor: parse(&lookup, "SHOWPULSE_COVERAGE_FLOOR", 0.60)?,
            rolling_window: parse(&lookup, "SHOWPULSE_ROLLING_WINDOW", 3)?,
            preview_rows: parse(&lookup, "SHOWPULSE_PREVIEW_ROWS", 25)?,
        })
    }
}
