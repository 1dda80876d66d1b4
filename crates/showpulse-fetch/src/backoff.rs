//! Retry with exponential backoff and jitter.
//!
//! The backoff schedule is an explicit policy object rather than inline loop
//! logic, and the jitter source is injectable, so the retry behavior can be
//! unit-tested deterministically without sleeping real wall-clock time.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Jitter in `[-1.0, 1.0]`, scaled by the policy's jitter fraction.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Default jitter from the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::random::<f64>() * 2.0 - 1.0
    }
}

/// Exponential backoff schedule: `base_delay * 2^n` for the n-th retry,
/// jittered by ±`jitter_fraction`, capped at `max_delay`, with a hard
/// attempt limit.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts per operation, first try included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay the jitter may add or remove.
    pub jitter_fraction: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter_fraction: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based), before jitter.
    #[must_use]
    pub fn raw_delay(&self, retry: u32) -> Duration {
        let scaled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry.min(16)));
        scaled.min(self.max_delay)
    }

    /// Jittered delay before retry number `retry` (0-based).
    #[must_use]
    pub fn delay(&self, retry: u32, jitter: &dyn JitterSource) -> Duration {
        let raw = self.raw_delay(retry);
        let factor = 1.0 + self.jitter_fraction * jitter.sample().clamp(-1.0, 1.0);
        raw.mul_f64(factor.max(0.0))
    }
}

/// Outcome of a retried operation, with the attempt count and total time
/// slept in backoff (always reported, success or failure).
pub(crate) struct RetryOutcome<T> {
    pub attempts: u32,
    pub total_wait: Duration,
    pub result: Result<T, FetchError>,
}

/// Run `operation` under `policy`, retrying retryable errors.
///
/// A [`FetchError::RateLimited`] retry honors the server's retry-after hint
/// when it exceeds the computed backoff delay. Terminal errors return
/// immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    jitter: &dyn JitterSource,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempts = 0u32;
    let mut total_wait = Duration::ZERO;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    attempts,
                    total_wait,
                    result: Ok(value),
                }
            }
            Err(err) => {
                if !err.is_retryable() || attempts >= policy.max_attempts {
                    return RetryOutcome {
                        attempts,
                        total_wait,
                        result: Err(err),
                    };
                }

                let mut delay = policy.delay(attempts - 1, jitter);
                if let FetchError::RateLimited {
                    retry_after_secs, ..
                } = &err
                {
                    delay = delay.max(Duration::from_secs(*retry_after_secs));
                }

                tracing::warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient fetch error, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                total_wait += delay;
            }
        }
    }
}
