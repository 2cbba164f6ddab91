//! Snapshot cache
//!
//! Session-durable storage of last-known-good payloads keyed by logical
//! resource name, each with its own freshness window. Lets the panel render
//! immediately from the last good snapshot while a live fetch is in flight
//! instead of flashing an empty state.
//!
//! Reads never fail: an expired, corrupt, or unparseable entry is a miss.
//! A miss does not evict the stale entry; a later `put` overwrites it.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const CACHE_FILE: &str = "panel_cache.json";

/// One cached payload. Valid iff `now - timestamp < ttl_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix milliseconds at store time.
    pub timestamp: i64,
    /// Freshness window in milliseconds.
    pub ttl_ms: i64,
    pub payload: Value,
}

/// File-backed TTL cache of resource snapshots.
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    path: PathBuf,
}

impl SnapshotCache {
    /// Open the cache under `data_dir`, loading any prior session's file.
    /// An unreadable or unparseable file is treated as an empty cache.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(CACHE_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&json) {
                Ok(map) => {
                    debug!("Loaded {} cache entries from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!("Cache file {} is corrupt, starting empty: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            entries: RwLock::new(entries),
            path,
        }
    }

    /// Store `payload` under `key` with the current timestamp, overwriting
    /// any prior entry for that key.
    pub async fn put<T: Serialize>(&self, key: &str, payload: &T, ttl_ms: i64) {
        self.put_at(key, payload, ttl_ms, Utc::now().timestamp_millis())
            .await;
    }

    /// `put` with an explicit store timestamp.
    pub async fn put_at<T: Serialize>(&self, key: &str, payload: &T, ttl_ms: i64, now_ms: i64) {
        let value = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                timestamp: now_ms,
                ttl_ms,
                payload: value,
            },
        );
        self.persist(&entries);
    }

    /// Fetch the payload under `key` if it is still fresh.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now().timestamp_millis()).await
    }

    /// `get` with an explicit read timestamp.
    pub async fn get_at<T: DeserializeOwned>(&self, key: &str, now_ms: i64) -> Option<T> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if now_ms - entry.timestamp >= entry.ttl_ms {
            debug!("Cache entry {} is stale", key);
            return None;
        }
        match serde_json::from_value(entry.payload.clone()) {
            Ok(payload) => Some(payload),
            Err(e) => {
                // Corrupt payloads read as a miss, never an error.
                warn!("Cache entry {} failed to decode: {}", key, e);
                None
            }
        }
    }

    /// Write-through to the session file. IO failures are logged, not raised;
    /// the in-memory entry stays authoritative for this session.
    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Failed to create cache dir {}: {}", dir.display(), e);
                return;
            }
        }
        match serde_json::to_string_pretty(entries) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    warn!("Failed to write cache file {}: {}", self.path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize cache: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> (tempfile::TempDir, SnapshotCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::open(dir.path());
        (dir, cache)
    }

    #[tokio::test]
    async fn test_fresh_entry_hits() {
        let (_dir, cache) = temp_cache();
        cache.put_at("account", &42u32, 1000, 10_000).await;
        let value: Option<u32> = cache.get_at("account", 10_500).await;
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn test_expired_entry_misses_at_exact_ttl() {
        let (_dir, cache) = temp_cache();
        cache.put_at("account", &42u32, 1000, 10_000).await;
        // now - timestamp == ttl is already stale
        let value: Option<u32> = cache.get_at("account", 11_000).await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_miss_does_not_evict_then_put_overwrites() {
        let (_dir, cache) = temp_cache();
        cache.put_at("cfg", &1u32, 100, 0).await;
        let stale: Option<u32> = cache.get_at("cfg", 5_000).await;
        assert_eq!(stale, None);
        // Entry is still there; a fresh put simply overwrites it.
        cache.put_at("cfg", &2u32, 100, 5_000).await;
        let value: Option<u32> = cache.get_at("cfg", 5_050).await;
        assert_eq!(value, Some(2));
    }

    #[tokio::test]
    async fn test_wrong_shape_payload_reads_as_miss() {
        let (_dir, cache) = temp_cache();
        cache.put_at("account", &"not a number", 10_000, 0).await;
        let value: Option<u32> = cache.get_at("account", 100).await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_survives_reopen_from_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = SnapshotCache::open(dir.path());
            cache.put_at("status", &7u32, 60_000, 0).await;
        }
        let reopened = SnapshotCache::open(dir.path());
        let value: Option<u32> = reopened.get_at("status", 100).await;
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CACHE_FILE), "{ not json").unwrap();
        let cache = SnapshotCache::open(dir.path());
        let value: Option<u32> = cache.get_at("anything", 0).await;
        assert_eq!(value, None);
    }
}
