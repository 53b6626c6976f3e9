//! Statistics types for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache activity and store usage
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Reads that returned a value (this process)
    pub hits: u64,

    /// Reads that found nothing usable (this process)
    pub misses: u64,

    /// Successful writes (this process)
    pub writes: u64,

    /// Entries removed because their TTL had passed
    pub expirations: u64,

    /// Entries removed by the size sweep
    pub evictions: u64,

    /// Entries removed by delete or tag invalidation
    pub invalidations: u64,

    /// Entry files currently on disk
    pub entries: usize,

    /// Entry files on disk whose TTL has passed
    pub expired_entries: usize,

    /// Total size of entry files in bytes
    pub size_bytes: u64,

    /// Tag records on disk
    pub tags: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Entries removed for any reason
    pub fn total_removals(&self) -> u64 {
        self.expirations + self.evictions + self.invalidations
    }

    /// Multi-line report for terminals
    pub fn summary(&self) -> String {
        [
            format!("  Entries:  {} ({} expired)", self.entries, self.expired_entries),
            format!("  Size:     {} bytes", self.size_bytes),
            format!("  Tags:     {}", self.tags),
            format!(
                "  Reads:    {} hits, {} misses ({:.2}% hit rate)",
                self.hits,
                self.misses,
                self.hit_rate()
            ),
            format!("  Writes:   {}", self.writes),
            format!(
                "  Removals: {} ({} expired, {} evicted, {} invalidated)",
                self.total_removals(),
                self.expirations,
                self.evictions,
                self.invalidations
            ),
        ]
        .join("\n")
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {} ({} expired), size: {} bytes, tags: {}, removals: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.expired_entries,
            self.size_bytes,
            self.tags,
            self.total_removals()
        )
    }
}

/// In-process counters shared by every caller of one cache
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl StatsCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, n: u64) {
        self.expirations.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, n: u64) {
        self.invalidations.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the counters into a stats snapshot
    pub fn fill(&self, stats: &mut CacheStats) {
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.writes = self.writes.load(Ordering::Relaxed);
        stats.expirations = self.expirations.load(Ordering::Relaxed);
        stats.evictions = self.evictions.load(Ordering::Relaxed);
        stats.invalidations = self.invalidations.load(Ordering::Relaxed);
    }
}
