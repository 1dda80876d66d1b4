//! HTTP fetch client with policy compliance, rate limiting, and retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::backoff::{retry_with_backoff, BackoffPolicy, JitterSource, ThreadRngJitter};
use crate::error::{ErrorCategory, FetchError};
use crate::robots::PolicyCache;
use crate::snapshots::SnapshotStore;

#[derive(Debug, Clone)]
pub struct FetchClientConfig {
    /// Identifying signature sent with every request, so operators can
    /// recognize and rate-limit the crawler courteously.
    pub user_agent: String,
    pub timeout: Duration,
    /// Minimum spacing between requests to the same host.
    pub min_host_delay: Duration,
    pub robots_ttl: Duration,
    pub robots_max_hosts: usize,
    pub backoff: BackoffPolicy,
}

impl Default for FetchClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "showpulse/0.1 (+https://github.com/research/showpulse; research crawler)"
                .to_owned(),
            timeout: Duration::from_secs(30),
            min_host_delay: Duration::from_secs(2),
            robots_ttl: Duration::from_secs(3_600),
            robots_max_hosts: 256,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// A successfully retrieved payload.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Result of one logical fetch, terminal success or failure included.
///
/// `attempts` and `total_wait` are always populated: a robots-blocked fetch
/// reports zero attempts, an exhausted retry loop reports every backoff
/// interval it slept.
#[derive(Debug)]
pub struct FetchResult {
    pub attempts: u32,
    pub total_wait: Duration,
    pub outcome: Result<FetchedBody, FetchError>,
}

impl FetchResult {
    #[must_use]
    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.outcome.as_ref().err().map(FetchError::category)
    }
}

/// Result of one logical JSON fetch: the decoded value on success, with the
/// same attempt/wait accounting as [`FetchResult`].
#[derive(Debug)]
pub struct JsonFetchResult<T> {
    pub attempts: u32,
    pub total_wait: Duration,
    pub outcome: Result<T, FetchError>,
}

impl<T> JsonFetchResult<T> {
    #[must_use]
    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.outcome.as_ref().err().map(FetchError::category)
    }
}

/// Per-URL fetch client shared by concurrent source workers.
///
/// Workers share only the per-host policy cache (read-mostly, idempotent
/// writes) and the snapshot store (append-with-eviction, partitioned by
/// identifier); everything else is per-call state.
pub struct FetchClient {
    http: Client,
    config: FetchClientConfig,
    jitter: Arc<dyn JitterSource>,
    policies: PolicyCache,
    snapshots: Option<Arc<SnapshotStore>>,
}

impl FetchClient {
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: FetchClientConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| FetchError::Network {
                url: "<client construction>".to_owned(),
                reason: e.to_string(),
            })?;
        let policies = PolicyCache::new(config.robots_ttl, config.robots_max_hosts);
        Ok(Self {
            http,
            config,
            jitter: Arc::new(ThreadRngJitter),
            policies,
            snapshots: None,
        })
    }

    /// Replace the jitter source (deterministic jitter in tests).
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Archive successful payloads into `store`, keyed by host.
    #[must_use]
    pub fn with_snapshots(mut self, store: Arc<SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Fetch one URL under the configured policy.
    ///
    /// Order of operations: resolve + consult the host's robots policy (no
    /// network I/O toward the target on a block), wait out the per-host
    /// minimum delay, then request with retry/backoff per the error
    /// taxonomy. Successful payloads are archived before returning.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let parsed = match reqwest::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return FetchResult {
                    attempts: 0,
                    total_wait: Duration::ZERO,
                    outcome: Err(FetchError::InvalidUrl {
                        url: url.to_owned(),
                        reason: e.to_string(),
                    }),
                }
            }
        };

        if !self
            .policies
            .is_allowed(&self.http, &self.config.user_agent, &parsed)
            .await
        {
            tracing::warn!(url, "fetch refused: disallowed by robots.txt");
            return FetchResult {
                attempts: 0,
                total_wait: Duration::ZERO,
                outcome: Err(FetchError::PolicyBlocked {
                    url: url.to_owned(),
                }),
            };
        }

        let host = parsed.host_str().unwrap_or_default().to_owned();
        tracing::info!(url, "GET");

        let outcome = retry_with_backoff(&self.config.backoff, self.jitter.as_ref(), || {
            self.attempt(url, &host)
        })
        .await;

        if let Ok(fetched) = &outcome.result {
            self.archive(&host, fetched);
        }

        FetchResult {
            attempts: outcome.attempts,
            total_wait: outcome.total_wait,
            outcome: outcome.result,
        }
    }

    /// Fetch a URL and decode its body as JSON, returning the decoded value.
    ///
    /// A body that does not decode is a [`FetchError::Parse`] — terminal,
    /// since a structurally invalid payload signals an upstream format
    /// change rather than a transient fault.
    pub async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> JsonFetchResult<T> {
        let result = self.fetch(url).await;
        let outcome = result.outcome.and_then(|fetched| {
            serde_json::from_str::<T>(&fetched.body).map_err(|e| FetchError::Parse {
                url: url.to_owned(),
                reason: e.to_string(),
            })
        });
        JsonFetchResult {
            attempts: result.attempts,
            total_wait: result.total_wait,
            outcome,
        }
    }

    async fn attempt(&self, url: &str, host: &str) -> Result<FetchedBody, FetchError> {
        self.policies
            .wait_turn(host, self.config.min_host_delay)
            .await;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url, &e))?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                host: host.to_owned(),
                retry_after_secs,
            });
        }
        if status.is_server_error() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }
        if status.is_client_error() {
            return Err(FetchError::ClientError {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_transport(url, &e))?;

        Ok(FetchedBody {
            url: url.to_owned(),
            status: status.as_u16(),
            body,
            fetched_at: Utc::now(),
        })
    }

    fn archive(&self, host: &str, fetched: &FetchedBody) {
        let Some(store) = &self.snapshots else {
            return;
        };
        if let Err(e) = store.save(host, &fetched.body, fetched.fetched_at) {
            // Archival is an audit aid; a failed write must not fail the fetch.
            tracing::warn!(host, error = %e, "snapshot archive failed");
        }
    }
}
