//! Two-tier TTL cache for scrape and metadata results.
//!
//! A fast in-memory tier (bounded key count, TTL eviction, opportunistic
//! sweep) sits in front of a disk tier under the user cache directory.
//! The disk tier outlives the process and memory-tier evictions; it is
//! consulted on a memory miss and repopulates the memory tier on a hit.
//!
//! Payloads are stored as JSON so one cache serves both `ScrapingResult`
//! and `EnhancedMetadata` values. Every I/O failure degrades to a miss or
//! no-op with a logged warning — a broken cache must never fail the
//! scrape or search that tried to use it.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default bound on memory-tier keys.
pub const DEFAULT_MEMORY_CAPACITY: usize = 256;

/// Sweep the memory tier every this many writes.
const SWEEP_EVERY: u64 = 32;

/// Cache errors. Always non-fatal for the engine; surfaced only by
/// explicit maintenance commands (`cache clear`).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to clear cache directory {0}: {1}")]
    Clear(PathBuf, std::io::Error),
}

/// One cached payload with its freshness window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    /// Unix timestamp in milliseconds at store time.
    pub created_at_ms: i64,
    pub ttl_secs: u64,
}

impl CacheEntry {
    fn new(payload: serde_json::Value, ttl_secs: u64) -> Self {
        Self {
            payload,
            created_at_ms: Utc::now().timestamp_millis(),
            ttl_secs,
        }
    }

    /// Expired when now − created > ttl.
    pub fn is_expired(&self) -> bool {
        let age_ms = Utc::now().timestamp_millis() - self.created_at_ms;
        age_ms > (self.ttl_secs as i64).saturating_mul(1000)
    }
}

/// Counters exposed by [`CacheStore::stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
}

/// Two-tier key/value store with per-entry TTL.
pub struct CacheStore {
    memory: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
    disk_dir: Option<PathBuf>,
    writes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
}

impl CacheStore {
    /// Create a cache with a disk tier rooted at `disk_dir`.
    pub fn new(capacity: usize, disk_dir: impl Into<PathBuf>) -> Self {
        let disk_dir = disk_dir.into();
        // Creation failure downgrades to memory-only operation.
        let disk_dir = match fs::create_dir_all(&disk_dir) {
            Ok(()) => Some(disk_dir),
            Err(e) => {
                tracing::warn!("Cache disk tier unavailable at {:?}: {}", disk_dir, e);
                None
            }
        };
        Self {
            memory: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            disk_dir,
            writes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
        }
    }

    /// Create a cache in the default location (user cache directory).
    pub fn default_location() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY, default_dir())
    }

    /// Memory-only cache (used in tests and when the disk tier fails).
    pub fn memory_only(capacity: usize) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            disk_dir: None,
            writes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
        }
    }

    /// Look up a key, checking memory first, then disk.
    ///
    /// A disk hit repopulates the memory tier with the entry's remaining
    /// freshness window. Expired entries in either tier count as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        // Memory tier. The lock covers only the map access, never I/O.
        let memory_entry = {
            let map = self.memory.lock();
            map.get(key).cloned()
        };
        if let Some(entry) = memory_entry {
            if !entry.is_expired() {
                if let Ok(value) = serde_json::from_value(entry.payload.clone()) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.memory_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
            } else {
                self.memory.lock().remove(key);
            }
        }

        // Disk tier.
        if let Some(entry) = self.disk_get(key) {
            if !entry.is_expired() {
                let value = serde_json::from_value(entry.payload.clone()).ok();
                if let Some(value) = value {
                    self.memory.lock().insert(key.to_string(), entry);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.disk_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value in both tiers with the given TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let payload = match serde_json::to_value(value) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Cache serialize failed for {}: {}", key, e);
                return;
            }
        };
        let entry = CacheEntry::new(payload, ttl_secs);

        {
            let mut map = self.memory.lock();
            map.insert(key.to_string(), entry.clone());
            if map.len() > self.capacity {
                evict_over_capacity(&mut map, self.capacity);
            }
        }

        self.disk_put(key, &entry);

        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }
    }

    /// Drop one key from both tiers.
    pub fn invalidate(&self, key: &str) {
        self.memory.lock().remove(key);
        if let Some(path) = self.disk_path(key) {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!("Cache invalidate failed for {:?}: {}", path, e);
                }
            }
        }
    }

    /// Drop everything from both tiers.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.memory.lock().clear();
        let Some(ref dir) = self.disk_dir else {
            return Ok(());
        };
        for entry in fs::read_dir(dir).map_err(|e| CacheError::Clear(dir.clone(), e))? {
            let entry = entry.map_err(|e| CacheError::Clear(dir.clone(), e))?;
            if entry.path().extension().and_then(|s| s.to_str()) == Some("json") {
                fs::remove_file(entry.path()).map_err(|e| CacheError::Clear(dir.clone(), e))?;
            }
        }
        Ok(())
    }

    /// Remove expired entries from the memory tier.
    pub fn sweep(&self) {
        let mut map = self.memory.lock();
        map.retain(|_, entry| !entry.is_expired());
    }

    /// Current tier sizes and hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        let memory_entries = self.memory.lock().len();
        let disk_entries = self
            .disk_dir
            .as_ref()
            .and_then(|dir| fs::read_dir(dir).ok())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
                    .count()
            })
            .unwrap_or(0);
        CacheStats {
            memory_entries,
            disk_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
        }
    }

    /// Test hook: age an entry by `ms` in both tiers so TTL expiry can
    /// be exercised without sleeping.
    #[cfg(test)]
    pub fn backdate_for_tests(&self, key: &str, ms: i64) {
        if let Some(entry) = self.memory.lock().get_mut(key) {
            entry.created_at_ms -= ms;
        }
        if let Some(path) = self.disk_path(key) {
            if let Some(mut entry) = self.disk_get(key) {
                entry.created_at_ms -= ms;
                if let Ok(contents) = serde_json::to_string(&entry) {
                    let _ = fs::write(&path, contents);
                }
            }
        }
    }

    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        // Keys are hex fingerprints, already filesystem-safe.
        self.disk_dir.as_ref().map(|d| d.join(format!("{key}.json")))
    }

    fn disk_get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.disk_path(key)?;
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Cache entry corrupt at {:?}: {}", path, e);
                    let _ = fs::remove_file(&path);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Cache read failed at {:?}: {}", path, e);
                None
            }
        }
    }

    fn disk_put(&self, key: &str, entry: &CacheEntry) {
        let Some(path) = self.disk_path(key) else {
            return;
        };
        let contents = match serde_json::to_string(entry) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Cache entry serialize failed for {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = fs::write(&path, contents) {
            tracing::warn!("Cache write failed at {:?}: {}", path, e);
        }
    }
}

/// Default disk-tier directory (user cache directory).
pub fn default_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("cratedigger")
}

/// Evict oldest entries (expired first) until the map fits the bound.
fn evict_over_capacity(map: &mut HashMap<String, CacheEntry>, capacity: usize) {
    map.retain(|_, entry| !entry.is_expired());
    while map.len() > capacity {
        let oldest = map
            .iter()
            .min_by_key(|(_, e)| e.created_at_ms)
            .map(|(k, _)| k.clone());
        match oldest {
            Some(key) => {
                map.remove(&key);
            }
            None => break,
        }
    }
}
