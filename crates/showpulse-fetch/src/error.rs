use serde::Serialize;
use thiserror::Error;

/// Typed fetch failures, split into retryable and terminal conditions.
///
/// A parse failure is terminal on purpose: a structurally invalid response is
/// a logic bug or an upstream format change, not a transient fault, and
/// retrying it would only hammer the host.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("path disallowed by robots.txt: {url}")]
    PolicyBlocked { url: String },

    #[error("rate limited by {host} (retry after {retry_after_secs}s)")]
    RateLimited { host: String, retry_after_secs: u64 },

    #[error("server error {status} from {url}")]
    ServerError { status: u16, url: String },

    #[error("client error {status} from {url}")]
    ClientError { status: u16, url: String },

    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("network failure for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("structurally invalid response from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Flat error category for run reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    PolicyBlocked,
    RateLimited,
    ServerError,
    ClientError,
    Timeout,
    Network,
    ParseError,
    InvalidUrl,
}

impl FetchError {
    /// Whether this error is worth retrying after a backoff delay.
    ///
    /// Retryable: 429, 5xx, timeouts, connection-level failures.
    /// Terminal: robots blocks, other 4xx, parse failures, bad URLs.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PolicyBlocked { .. } => ErrorCategory::PolicyBlocked,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::ServerError { .. } => ErrorCategory::ServerError,
            Self::ClientError { .. } => ErrorCategory::ClientError,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Network { .. } => ErrorCategory::Network,
            Self::Parse { .. } => ErrorCategory::ParseError,
            Self::InvalidUrl { .. } => ErrorCategory::InvalidUrl,
        }
    }

    /// Map a transport-level `reqwest` failure onto the taxonomy.
    pub(crate) fn from_transport(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_owned(),
            }
        } else {
            Self::Network {
                url: url.to_owned(),
                reason: err.to_string(),
            }
        }
    }
}
