//! Resilient per-URL fetching for the showpulse pipeline.
//!
//! The client refuses paths disallowed by a host's robots.txt before any
//! network I/O, rate-limits itself per host, retries transient failures with
//! jittered exponential backoff, and archives successful payloads in a
//! rolling snapshot store for postmortem debugging. Every call reports its
//! attempt count and accumulated wait time whether it succeeded or not.

pub mod backoff;
pub mod client;
pub mod error;
pub mod robots;
pub mod snapshots;

pub use backoff::{BackoffPolicy, JitterSource, ThreadRngJitter};
pub use client::{FetchClient, FetchClientConfig, FetchResult, FetchedBody, JsonFetchResult};
pub use error::{ErrorCategory, FetchError};
pub use robots::{PolicyCache, RobotsPolicy};
pub use snapshots::{SnapshotError, SnapshotMeta, SnapshotStore};
