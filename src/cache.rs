//! Two-tier cache for metadata lookups.
//!
//! **Hot** – in-process map, always a subset of the durable tier.
//! **Durable** – one JSON file per entry plus an `index.json` mapping cache
//! keys to write timestamps, so a lookup never scans the directory.
//!
//! Keys are the SHA-256 of the exact request path (query string included).
//! Expiry is checked on read; [`CacheStore::cleanup`] is the only sweep.
//! Nothing in here fails a caller's request: disk problems are logged and the
//! entry is treated as a miss.

use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Entries older than this are treated as absent: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const INDEX_FILE: &str = "index.json";

/// On-disk shape of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    /// Original request path, kept for debugging and alias detection
    path: String,
    /// Write time, Unix milliseconds
    timestamp: i64,
    data: Value,
}

#[derive(Debug, Clone)]
struct HotEntry {
    data: Value,
    timestamp: i64,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hot_count: usize,
    pub durable_count: usize,
    pub total_size_bytes: u64,
}

/// Persistent key/value store with expiry, keyed by request path.
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    hot: Mutex<HashMap<String, HotEntry>>,
    index: Mutex<HashMap<String, i64>>,
}

impl CacheStore {
    /// Open (or create) a cache rooted at `dir` with the default 7-day window.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_ttl(dir, DEFAULT_TTL)
    }

    pub fn with_ttl(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let index = load_index(&dir.join(INDEX_FILE));
        debug!(dir = %dir.display(), entries = index.len(), "Opened cache");

        Ok(Self {
            dir,
            ttl,
            hot: Mutex::new(HashMap::new()),
            index: Mutex::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a request path. Expired or unreadable entries are purged and
    /// reported as absent.
    pub fn get(&self, request_path: &str) -> Option<Value> {
        let key = cache_key(request_path);
        let now = now_millis();

        let hot_hit = self.hot().get(&key).cloned();
        if let Some(entry) = hot_hit {
            if !self.is_expired(entry.timestamp, now) {
                debug!(path = request_path, "Cache hit (hot)");
                return Some(entry.data);
            }
            debug!(path = request_path, "Cache entry expired");
            self.purge(&key);
            return None;
        }

        let timestamp = self.index().get(&key).copied()?;
        if self.is_expired(timestamp, now) {
            debug!(path = request_path, "Cache entry expired");
            self.purge(&key);
            return None;
        }

        match self.read_entry(&key) {
            Ok(entry) if entry.path == request_path => {
                debug!(path = request_path, "Cache hit (durable)");
                self.hot().insert(
                    key,
                    HotEntry {
                        data: entry.data.clone(),
                        timestamp: entry.timestamp,
                    },
                );
                Some(entry.data)
            }
            Ok(entry) => {
                warn!(path = request_path, stored = %entry.path, "Cache key collision, evicting");
                self.purge(&key);
                None
            }
            Err(e) => {
                warn!(path = request_path, error = %e, "Unreadable cache entry, evicting");
                self.purge(&key);
                None
            }
        }
    }

    /// Store `data` under `request_path` in both tiers. Best-effort.
    /// Drop one entry from both tiers.
    pub fn remove(&self, request_path: &str) {
        self.purge(&cache_key(request_path));
    }

    pub fn set(&self, request_path: &str, data: Value) {
        self.store(request_path, data, now_millis());
    }

    fn store(&self, request_path: &str, data: Value, timestamp: i64) {
        let key = cache_key(request_path);
        let entry = StoredEntry {
            path: request_path.to_string(),
            timestamp,
            data,
        };

        if let Err(e) = self.write_entry(&key, &entry) {
            warn!(path = request_path, error = %e, "Failed to write cache entry");
            return;
        }
        self.index().insert(key.clone(), timestamp);
        self.persist_index();
        self.hot().insert(
            key,
            HotEntry {
                data: entry.data,
                timestamp,
            },
        );
    }

    /// Remove every expired entry from both tiers. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = now_millis();
        let expired: Vec<String> = self
            .index()
            .iter()
            .filter(|(_, ts)| self.is_expired(**ts, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.hot().remove(key);
            self.remove_file(key);
            self.index().remove(key);
        }
        self.hot().retain(|_, entry| !self.is_expired(entry.timestamp, now));

        if !expired.is_empty() {
            self.persist_index();
        }
        info!(removed = expired.len(), "Cache cleanup complete");
        expired.len()
    }

    /// Drop every entry, hot and durable.
    pub fn clear(&self) -> Result<()> {
        self.hot().clear();
        self.index().clear();

        for dir_entry in std::fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path)?;
            }
        }
        info!(dir = %self.dir.display(), "Cache cleared");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let hot_count = self.hot().len();
        let keys: Vec<String> = self.index().keys().cloned().collect();
        let total_size_bytes = keys
            .iter()
            .filter_map(|key| std::fs::metadata(self.entry_path(key)).ok())
            .map(|meta| meta.len())
            .sum();

        CacheStats {
            hot_count,
            durable_count: keys.len(),
            total_size_bytes,
        }
    }

    fn is_expired(&self, timestamp: i64, now: i64) -> bool {
        u128::try_from(now.saturating_sub(timestamp)).is_ok_and(|age| age > self.ttl.as_millis())
    }

    fn purge(&self, key: &str) {
        self.hot().remove(key);
        self.remove_file(key);
        if self.index().remove(key).is_some() {
            self.persist_index();
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read_entry(&self, key: &str) -> Result<StoredEntry> {
        let content = std::fs::read_to_string(self.entry_path(key))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_entry(&self, key: &str, entry: &StoredEntry) -> Result<()> {
        let path = self.entry_path(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(entry)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_file(&self, key: &str) {
        let path = self.entry_path(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
    }

    fn persist_index(&self) {
        if let Err(e) = self.write_index() {
            warn!(dir = %self.dir.display(), error = %e, "Failed to write cache index");
        }
    }

    fn write_index(&self) -> Result<()> {
        let bytes = serde_json::to_vec(&*self.index())?;
        std::fs::write(self.dir.join(INDEX_FILE), bytes)?;
        Ok(())
    }

    fn hot(&self) -> MutexGuard<'_, HashMap<String, HotEntry>> {
        self.hot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn index(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Stable cache key for a request path: lowercase hex SHA-256.
pub fn cache_key(request_path: &str) -> String {
    let digest = Sha256::digest(request_path.as_bytes());
    format!("{:x}", digest)
}

fn load_index(path: &Path) -> HashMap<String, i64> {
    if !path.exists() {
        return HashMap::new();
    }
    match read_index(path) {
        Ok(index) => index,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache index unreadable, starting empty");
            HashMap::new()
        }
    }
}

fn read_index(path: &Path) -> Result<HashMap<String, i64>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
