//! Best-effort on-disk copy of cache entries.
//!
//! One JSON file per cell (`<geohash>.json`). Each write goes to its own
//! temporary file that is renamed over the target, so a reader sees either
//! the old or the new entry for a key, never a torn one. Operations carry the
//! sequence number the cache assigned under its lock; an operation older than
//! the last one applied to the same key is skipped, so the file always ends up
//! matching the in-memory entry. Nothing here is required for correctness: an
//! empty, missing or unreadable directory just means a cold cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cell::CellKey;
use crate::error::{CacheError, CacheResult};

/// Serialized form of a cache entry.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedEntry {
    pub key: CellKey,
    pub fetched_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Serialize)]
struct PersistedEntryRef<'a> {
    key: &'a CellKey,
    fetched_at: DateTime<Utc>,
    payload: &'a serde_json::Value,
}

#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    /// Sequence of the last write or removal applied per key.
    applied: Mutex<HashMap<CellKey, u64>>,
    temp_counter: AtomicU64,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            applied: Mutex::new(HashMap::new()),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CellKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    /// Unique per process and call.
    fn temp_path(&self, key: &CellKey) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{}.{}.{}.tmp", key.as_str(), std::process::id(), n))
    }

    /// Write one entry, replacing any previous file for the same key.
    ///
    /// Returns `Ok(false)` when a newer operation for the key already ran.
    pub(crate) async fn write(
        &self,
        key: &CellKey,
        seq: u64,
        fetched_at: DateTime<Utc>,
        payload: &serde_json::Value,
    ) -> CacheResult<bool> {
        let body = serde_json::to_vec(&PersistedEntryRef {
            key,
            fetched_at,
            payload,
        })
        .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let mut applied = self.applied.lock().await;
        if applied.get(key).is_some_and(|&last| last > seq) {
            debug!(cell = %key, seq, "Skipping superseded cache write");
            return Ok(false);
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::Io(format!("create {}: {}", self.dir.display(), e)))?;

        let final_path = self.entry_path(key);
        let temp_path = self.temp_path(key);

        if let Err(e) = fs::write(&temp_path, &body).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::Io(format!("write {}: {}", temp_path.display(), e)));
        }
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::Io(format!("rename {}: {}", final_path.display(), e)));
        }
        applied.insert(key.clone(), seq);

        debug!(cell = %key, seq, path = %final_path.display(), "Persisted cache entry");
        Ok(true)
    }

    /// Remove the file for an evicted key, unless a newer write replaced it.
    pub(crate) async fn remove(&self, key: &CellKey, seq: u64) -> CacheResult<()> {
        let mut applied = self.applied.lock().await;
        if applied.get(key).is_some_and(|&last| last > seq) {
            return Ok(());
        }
        applied.insert(key.clone(), seq);
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e.to_string())),
        }
    }

    /// Read every readable entry in the directory.
    ///
    /// Unreadable or malformed files are skipped with a warning.
    pub(crate) async fn load_all(&self) -> Vec<PersistedEntry> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.dir.display(), "Cache directory does not exist yet");
                return entries;
            }
            Err(e) => {
                warn!(path = %self.dir.display(), error = %e, "Failed to read cache directory");
                return entries;
            }
        };

        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to list cache directory entry");
                    break;
                }
            };

            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let content = match fs::read(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read cache file");
                    continue;
                }
            };

            match serde_json::from_slice::<PersistedEntry>(&content) {
                Ok(persisted) if CellKey::parse(persisted.key.as_str()).is_some() => {
                    entries.push(persisted)
                }
                Ok(_) => warn!(path = %path.display(), "Ignoring cache file with invalid key"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring malformed cache file")
                }
            }
        }

        entries
    }
}
