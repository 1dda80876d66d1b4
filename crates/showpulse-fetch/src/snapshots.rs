//! Rolling snapshot archive for raw response payloads.
//!
//! Every successful fetch is archived keyed by (identifier, timestamp) so
//! parser failures can be debugged against the exact bytes that were
//! received. Retention is a bounded rolling window per identifier: once the
//! cap is exceeded the oldest snapshots are evicted. Eviction is atomic with
//! respect to concurrent appends for the same identifier via a
//! per-identifier lock; identifiers never contend with each other.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metadata saved next to each snapshot body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub identifier: String,
    pub fetched_at: DateTime<Utc>,
    pub bytes: usize,
    pub sha256: String,
}

pub struct SnapshotStore {
    base_dir: PathBuf,
    max_per_identifier: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SnapshotStore {
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the base directory cannot be created.
    pub fn new(base_dir: impl Into<PathBuf>, max_per_identifier: usize) -> Result<Self, SnapshotError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            max_per_identifier: max_per_identifier.max(1),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Archive one payload, evicting the oldest snapshots for this
    /// identifier beyond the retention cap. Returns the body path.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] on filesystem or metadata failures.
    pub fn save(
        &self,
        identifier: &str,
        body: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<PathBuf, SnapshotError> {
        let lock = self.lock_for(identifier);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let dir = self.identifier_dir(identifier);
        fs::create_dir_all(&dir)?;

        let stamp = fetched_at.format("%Y%m%d_%H%M%S%3f").to_string();
        let body_path = dir.join(format!("{stamp}.body"));
        let meta_path = dir.join(format!("{stamp}.json"));

        let meta = SnapshotMeta {
            identifier: identifier.to_owned(),
            fetched_at,
            bytes: body.len(),
            sha256: format!("{:x}", Sha256::digest(body.as_bytes())),
        };

        fs::write(&body_path, body)?;
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)?;
        tracing::debug!(identifier, path = %body_path.display(), "snapshot archived");

        self.evict_beyond_cap(&dir)?;
        Ok(body_path)
    }

    /// Most recent snapshot for an identifier, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] on filesystem or metadata failures.
    pub fn latest(&self, identifier: &str) -> Result<Option<(String, SnapshotMeta)>, SnapshotError> {
        let dir = self.identifier_dir(identifier);
        let Some(newest) = Self::body_files(&dir)?.into_iter().max() else {
            return Ok(None);
        };
        let body = fs::read_to_string(&newest)?;
        let meta: SnapshotMeta =
            serde_json::from_str(&fs::read_to_string(newest.with_extension("json"))?)?;
        Ok(Some((body, meta)))
    }

    /// Number of retained snapshots for an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the directory cannot be listed.
    pub fn count(&self, identifier: &str) -> Result<usize, SnapshotError> {
        Ok(Self::body_files(&self.identifier_dir(identifier))?.len())
    }

    fn identifier_dir(&self, identifier: &str) -> PathBuf {
        let safe: String = identifier
            .trim_start_matches('@')
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.base_dir.join(safe)
    }

    fn lock_for(&self, identifier: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(identifier.to_owned()).or_default())
    }

    fn body_files(dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "body"))
            .collect();
        files.sort();
        Ok(files)
    }

    fn evict_beyond_cap(&self, dir: &Path) -> Result<(), SnapshotError> {
        let files = Self::body_files(dir)?;
        if files.len() <= self.max_per_identifier {
            return Ok(());
        }
        let excess = files.len() - self.max_per_identifier;
        for body_path in &files[..excess] {
            fs::remove_file(body_path)?;
            let meta_path = body_path.with_extension("json");
            if meta_path.exists() {
                fs::remove_file(meta_path)?;
            }
        }
        tracing::debug!(dir = %dir.display(), evicted = excess, "evicted old snapshots");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, second).unwrap()
    }

    #[test]
    fn save_and_read_back_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), 5).unwrap();
        store.save("@ohmaryplay", "<html>v1</html>", at(0, 0)).unwrap();
        store.save("@ohmaryplay", "<html>v2</html>", at(0, 30)).unwrap();

        let (body, meta) = store.latest("@ohmaryplay").unwrap().unwrap();
        assert_eq!(body, "<html>v2</html>");
        assert_eq!(meta.bytes, body.len());
        assert_eq!(meta.sha256.len(), 64);
    }

    #[test]
    fn retention_evicts_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), 3).unwrap();
        for i in 0..5u32 {
            store.save("handle", &format!("body {i}"), at(i, 0)).unwrap();
        }
        assert_eq!(store.count("handle").unwrap(), 3);
        let (body, _) = store.latest("handle").unwrap().unwrap();
        assert_eq!(body, "body 4");
    }

    #[test]
    fn identifiers_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), 1).unwrap();
        store.save("a", "alpha", at(0, 0)).unwrap();
        store.save("b", "beta", at(0, 0)).unwrap();
        assert_eq!(store.count("a").unwrap(), 1);
        assert_eq!(store.count("b").unwrap(), 1);
        assert_eq!(store.latest("a").unwrap().unwrap().0, "alpha");
    }

    #[test]
    fn missing_identifier_has_no_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), 5).unwrap();
        assert!(store.latest("nobody").unwrap().is_none());
        assert_eq!(store.count("nobody").unwrap(), 0);
    }
}
