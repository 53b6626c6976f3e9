//! File-backed cache store with TTL expiry and hash-sharded directories

use crate::cache::{
    clock::{Clock, SystemClock},
    config::CacheConfig,
    entry::{CacheEntry, EntryHeader},
    invalidation::InvalidationReason,
    types::{CacheStats, StatsCounters},
};
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extension of entry files
pub(crate) const ENTRY_EXT: &str = "cache";

/// Extension of tag records
pub(crate) const TAG_EXT: &str = "tag";

/// Directory under the root holding tag records
pub(crate) const TAGS_DIR: &str = "tags";

/// Extension of in-flight writes
pub(crate) const TEMP_EXT: &str = "tmp";

/// Temporary files older than this are leftovers of interrupted writes
const STALE_TEMP_AGE: Duration = Duration::from_secs(300);

/// Durable key/value cache with expiry
///
/// Each key lives in its own JSON file at
/// `<cache_dir>/<shard>/<sha256(key)>.cache`, where the shard is a prefix of
/// the hash. Every operation is a blocking filesystem call on the caller's
/// thread.
///
/// Faults in the store never reach the caller: an unreadable entry is a
/// miss and gets deleted, a failed write returns `false`. Build one instance
/// at start-up and share it by `Arc`.
pub struct FileCache {
    /// Cache configuration
    pub(crate) config: CacheConfig,

    clock: Arc<dyn Clock>,

    counters: StatsCounters,
}

/// An entry file found while scanning the store
#[derive(Debug, Clone)]
pub(crate) struct EntryFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl FileCache {
    /// Open (creating if needed) a cache rooted at `config.cache_dir`
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open a cache that reads time from `clock`
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.cache_dir)?;

        info!(
            cache_dir = %config.cache_dir.display(),
            max_size_bytes = config.max_size_bytes,
            "Opened file cache"
        );

        Ok(Self {
            config,
            clock,
            counters: StatsCounters::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.config.cache_dir
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.counters
    }

    /// Location of the file that holds `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let hash = hash_hex(key);
        let shard = &hash[..self.config.shard_prefix_len];
        self.root()
            .join(shard)
            .join(format!("{}.{}", hash, ENTRY_EXT))
    }

    /// Store `value` under `key` for `ttl`
    ///
    /// Overwrites any previous value. Returns `false` if the entry could not
    /// be written.
    pub fn set<V: Serialize>(&self, key: &str, value: &V, ttl: Duration) -> bool {
        match self.write_entry(key, value, ttl) {
            Ok(()) => {
                debug!("Stored cache entry: {}", key);
                if self.config.enable_metrics {
                    self.counters.record_write();
                }
                self.evict_after_write();
                true
            }
            Err(e) => {
                warn!("Failed to store cache entry {}: {}", key, e);
                false
            }
        }
    }

    /// Store `value` under `key` with the configured default TTL
    pub fn set_default<V: Serialize>(&self, key: &str, value: &V) -> bool {
        self.set(key, value, self.config.default_ttl)
    }

    /// Read the value stored under `key`
    ///
    /// Missing, expired and unreadable entries all yield `None`; the latter
    /// two are deleted. A hit bumps the entry's hit counter on disk.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let path = self.entry_path(key);

        let mut entry = match read_json::<CacheEntry<serde_json::Value>>(&path) {
            Ok(Some(entry)) if entry.key == key => entry,
            Ok(Some(entry)) => {
                debug!("Cache key collision: {} vs stored {}", key, entry.key);
                self.record_miss();
                return None;
            }
            Ok(None) => {
                debug!("Cache miss: {}", key);
                self.record_miss();
                return None;
            }
            Err(e) => {
                debug!("Unreadable cache entry {}: {}", key, e);
                self.discard(&path, key, InvalidationReason::Corrupt);
                self.record_miss();
                return None;
            }
        };

        if entry.is_expired(self.now()) {
            debug!("Cache entry expired: {}", key);
            self.discard(&path, key, InvalidationReason::Expired);
            self.record_miss();
            return None;
        }

        entry.mark_hit();
        let updated = serde_json::to_vec(&entry);

        let value = match serde_json::from_value::<V>(entry.value) {
            Ok(value) => value,
            Err(e) => {
                debug!("Cache entry {} does not decode: {}", key, e);
                self.discard(&path, key, InvalidationReason::Corrupt);
                self.record_miss();
                return None;
            }
        };

        // Hit counter is informational; losing an update is fine. A delete
        // landing between the existence check and the rename can still
        // resurrect the entry.
        match updated {
            Ok(bytes) => match rewrite_existing(&path, &bytes) {
                Ok(true) => {}
                Ok(false) => debug!("Entry {} removed during read, hit count dropped", key),
                Err(e) => debug!("Failed to persist hit count for {}: {}", key, e),
            },
            Err(e) => debug!("Failed to encode hit count for {}: {}", key, e),
        }

        debug!("Cache hit: {}", key);
        if self.config.enable_metrics {
            self.counters.record_hit();
        }
        Some(value)
    }

    /// Read `key`, falling back to `default`
    pub fn get_or<V: DeserializeOwned>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Check whether a live entry exists for `key`
    ///
    /// Applies the same expiry and corruption handling as `get` but leaves
    /// the hit counter alone.
    pub fn has(&self, key: &str) -> bool {
        let path = self.entry_path(key);

        match read_json::<EntryHeader>(&path) {
            Ok(Some(header)) if header.key != key => false,
            Ok(Some(header)) => {
                if header.is_expired(self.now()) {
                    self.discard(&path, key, InvalidationReason::Expired);
                    false
                } else {
                    true
                }
            }
            Ok(None) => false,
            Err(e) => {
                debug!("Unreadable cache entry {}: {}", key, e);
                self.discard(&path, key, InvalidationReason::Corrupt);
                false
            }
        }
    }

    /// Remove `key`
    ///
    /// Idempotent: removing a missing key succeeds. Returns `false` only if
    /// the file exists and could not be removed.
    pub fn delete(&self, key: &str) -> bool {
        let path = self.entry_path(key);

        match remove_if_exists(&path) {
            Ok(removed) => {
                if removed {
                    debug!("Removed cache entry ({}): {}", InvalidationReason::Manual, key);
                    if self.config.enable_metrics {
                        self.counters.record_invalidations(1);
                    }
                }
                true
            }
            Err(e) => {
                warn!("Failed to remove cache entry {}: {}", key, e);
                false
            }
        }
    }

    /// Remove every entry and tag record, returning the number of entries removed
    ///
    /// Temporary files of unfinished writes are removed too.
    pub fn clear(&self) -> usize {
        let mut removed = 0;

        for file in self.scan_entries() {
            match remove_if_exists(&file.path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to remove {}: {}", file.path.display(), e),
            }
        }

        let tags_dir = self.root().join(TAGS_DIR);
        for path in files_with_ext(&tags_dir, TAG_EXT) {
            if let Err(e) = remove_if_exists(&path) {
                warn!("Failed to remove tag record {}: {}", path.display(), e);
            }
        }

        self.sweep_temp_files(Duration::ZERO);

        if self.config.enable_metrics {
            self.counters.record_invalidations(removed as u64);
        }
        info!("Cleared {} entries from cache ({})", removed, InvalidationReason::Cleared);
        removed
    }

    /// Remove expired entries, returning the number removed
    ///
    /// Entry files that cannot be read are removed and counted as well.
    /// Temporary files left by interrupted writes are removed once stale but
    /// not counted.
    pub fn cleanup(&self) -> usize {
        let now = self.now();
        let mut removed = 0;

        for file in self.scan_entries() {
            let reason = match read_json::<EntryHeader>(&file.path) {
                Ok(Some(header)) if header.is_expired(now) => InvalidationReason::Expired,
                Ok(_) => continue,
                Err(_) => InvalidationReason::Corrupt,
            };

            match remove_if_exists(&file.path) {
                Ok(true) => {
                    debug!("Removed {} ({})", file.path.display(), reason);
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to remove {}: {}", file.path.display(), e),
            }
        }

        self.sweep_temp_files(STALE_TEMP_AGE);

        if self.config.enable_metrics {
            self.counters.record_expirations(removed as u64);
        }
        if removed > 0 {
            info!("Cleaned up {} expired entries", removed);
        }
        removed
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn remember<V, F>(&self, key: &str, ttl: Duration, compute: F) -> V
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> V,
    {
        match self.try_remember(key, ttl, || Ok::<V, Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like `remember`, for computations that can fail
    ///
    /// An error from `compute` is returned as-is and nothing is stored.
    pub fn try_remember<V, E, F>(&self, key: &str, ttl: Duration, compute: F) -> std::result::Result<V, E>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let started = Instant::now();
        let value = compute()?;
        self.report_slow(key, started.elapsed());

        self.set(key, &value, ttl);
        Ok(value)
    }

    /// Snapshot of counters and store usage
    pub fn stats(&self) -> CacheStats {
        let now = self.now();
        let mut stats = CacheStats::default();
        self.counters.fill(&mut stats);

        for file in self.scan_entries() {
            stats.entries += 1;
            stats.size_bytes += file.size;
            match read_json::<EntryHeader>(&file.path) {
                Ok(Some(header)) if !header.is_expired(now) => {}
                _ => stats.expired_entries += 1,
            }
        }

        stats.tags = files_with_ext(&self.root().join(TAGS_DIR), TAG_EXT).len();
        stats
    }

    /// Log computations slower than the configured threshold
    ///
    /// Returns whether a warning was emitted.
    pub(crate) fn report_slow(&self, key: &str, elapsed: Duration) -> bool {
        if elapsed <= self.config.slow_query_threshold {
            return false;
        }

        warn!(
            key = key,
            elapsed_ms = elapsed.as_millis() as u64,
            threshold_ms = self.config.slow_query_threshold.as_millis() as u64,
            "Slow cache computation"
        );
        true
    }

    /// Shard directories under the root
    fn shard_dirs(&self) -> Vec<PathBuf> {
        let shards = match fs::read_dir(self.root()) {
            Ok(shards) => shards,
            Err(e) => {
                warn!("Failed to list cache root {}: {}", self.root().display(), e);
                return Vec::new();
            }
        };

        shards
            .flatten()
            .map(|shard| shard.path())
            .filter(|path| path.is_dir() && !path.file_name().is_some_and(|n| n == TAGS_DIR))
            .collect()
    }

    /// Remove temporary files older than `min_age`, returning how many went
    fn sweep_temp_files(&self, min_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut dirs = self.shard_dirs();
        dirs.push(self.root().join(TAGS_DIR));

        let mut removed = 0;
        for path in dirs.iter().flat_map(|dir| files_with_ext(dir, TEMP_EXT)) {
            let stale = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .map(|modified| now.duration_since(modified).unwrap_or_default() >= min_age)
                .unwrap_or(false);
            if !stale {
                continue;
            }

            match remove_if_exists(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            debug!("Removed {} leftover temporary files", removed);
        }
        removed
    }

    /// All entry files in the store
    pub(crate) fn scan_entries(&self) -> Vec<EntryFile> {
        let mut files = Vec::new();

        for path in self.shard_dirs() {
            for entry_path in files_with_ext(&path, ENTRY_EXT) {
                let Ok(meta) = fs::metadata(&entry_path) else {
                    continue;
                };
                files.push(EntryFile {
                    path: entry_path,
                    size: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
        }

        files
    }

    fn write_entry<V: Serialize>(&self, key: &str, value: &V, ttl: Duration) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("key must not be empty".to_string()));
        }

        let ttl = self.config.ttl_with_jitter(ttl);
        let entry = CacheEntry::new(key, value, ttl, self.now());
        let bytes = serde_json::to_vec(&entry)?;

        write_atomic(&self.entry_path(key), &bytes)
    }

    fn evict_after_write(&self) {
        if self.config.enable_size_eviction && self.config.max_size_bytes > 0 {
            self.evict_to_limit();
        }
    }

    fn discard(&self, path: &Path, key: &str, reason: InvalidationReason) {
        match remove_if_exists(path) {
            Ok(true) => {
                debug!("Removed cache entry ({}): {}", reason, key);
                if self.config.enable_metrics && reason == InvalidationReason::Expired {
                    self.counters.record_expirations(1);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to remove cache entry {}: {}", key, e),
        }
    }

    fn record_miss(&self) {
        if self.config.enable_metrics {
            self.counters.record_miss();
        }
    }
}

/// Hex SHA-256 of a key or tag name
pub(crate) fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Read and decode a JSON file; `Ok(None)` if it does not exist
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Write through a temporary file and rename it into place
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension(format!("{}.{}", Uuid::new_v4().simple(), TEMP_EXT));
    if let Err(e) = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Replace a file only if it still exists; `Ok(false)` if it is gone
fn rewrite_existing(path: &Path, bytes: &[u8]) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    write_atomic(path, bytes)?;
    Ok(true)
}

/// Remove a file; `Ok(false)` if it was already gone
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Files directly under `dir` with extension `ext`
pub(crate) fn files_with_ext(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == ext))
        .collect()
}
