//! Configuration for the cache system

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the file cache
///
/// - Default TTL: 1 hour
/// - Size limit: 100 MB, swept down to 80% when exceeded
/// - Shards: two hex characters, at most 256 directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory of the store
    pub cache_dir: PathBuf,

    /// Time-to-live used when callers do not pass one
    pub default_ttl: Duration,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads expiry of entries written together
    pub ttl_jitter: f64,

    /// Maximum total size of entry files in bytes, 0 disables the limit
    pub max_size_bytes: u64,

    /// Fraction of `max_size_bytes` an eviction sweep shrinks the store to
    pub eviction_target_ratio: f64,

    /// Run the size check after every write
    pub enable_size_eviction: bool,

    /// Number of leading hash characters used as the shard directory name
    pub shard_prefix_len: usize,

    /// Computations slower than this are logged
    pub slow_query_threshold: Duration,

    /// Enable in-process hit/miss counters
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            default_ttl: Duration::from_secs(3600),
            ttl_jitter: 0.0,
            // 100 MB default
            max_size_bytes: 100 * 1024 * 1024,
            eviction_target_ratio: 0.8,
            enable_size_eviction: true,
            shard_prefix_len: 2,
            slow_query_threshold: Duration::from_secs(1),
            enable_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Load configuration from the environment (and a `.env` file if present)
    ///
    /// Unset variables fall back to the defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PORTAL_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_number("PORTAL_CACHE_TTL_SECS")? {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Some(bytes) = env_number("PORTAL_CACHE_MAX_SIZE_BYTES")? {
            config.max_size_bytes = bytes;
        }
        if let Some(len) = env_number("PORTAL_CACHE_SHARD_LEN")? {
            config.shard_prefix_len = len as usize;
        }
        if let Some(ms) = env_number("PORTAL_CACHE_SLOW_QUERY_MS")? {
            config.slow_query_threshold = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(CacheError::Config("cache_dir must not be empty".to_string()));
        }

        if self.default_ttl.is_zero() {
            return Err(CacheError::Config(
                "default_ttl must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.eviction_target_ratio <= 0.0 || self.eviction_target_ratio > 1.0 {
            return Err(CacheError::Config(
                "eviction_target_ratio must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.shard_prefix_len == 0 || self.shard_prefix_len > 8 {
            return Err(CacheError::Config(
                "shard_prefix_len must be between 1 and 8".to_string(),
            ));
        }

        Ok(())
    }

    /// Byte count an eviction sweep stops at
    pub fn eviction_target_bytes(&self) -> u64 {
        (self.max_size_bytes as f64 * self.eviction_target_ratio) as u64
    }

    /// Apply jitter to a TTL
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return ttl;
        }

        let base_secs = ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| CacheError::Config(format!("{name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    cache_dir: Option<PathBuf>,
    default_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    max_size_bytes: Option<u64>,
    eviction_target_ratio: Option<f64>,
    enable_size_eviction: Option<bool>,
    shard_prefix_len: Option<usize>,
    slow_query_threshold: Option<Duration>,
    enable_metrics: Option<bool>,
}

impl CacheConfigBuilder {
    /// Set the store root directory
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set maximum cache size in bytes
    pub fn max_size_bytes(mut self, size: u64) -> Self {
        self.max_size_bytes = Some(size);
        self
    }

    /// Set the fraction of the maximum size an eviction sweep shrinks to
    pub fn eviction_target_ratio(mut self, ratio: f64) -> Self {
        self.eviction_target_ratio = Some(ratio);
        self
    }

    /// Enable or disable the size check after writes
    pub fn enable_size_eviction(mut self, enable: bool) -> Self {
        self.enable_size_eviction = Some(enable);
        self
    }

    /// Set the shard directory name length
    pub fn shard_prefix_len(mut self, len: usize) -> Self {
        self.shard_prefix_len = Some(len);
        self
    }

    /// Set the slow computation threshold
    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            cache_dir: self.cache_dir.unwrap_or(defaults.cache_dir),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            max_size_bytes: self.max_size_bytes.unwrap_or(defaults.max_size_bytes),
            eviction_target_ratio: self
                .eviction_target_ratio
                .unwrap_or(defaults.eviction_target_ratio),
            enable_size_eviction: self
                .enable_size_eviction
                .unwrap_or(defaults.enable_size_eviction),
            shard_prefix_len: self.shard_prefix_len.unwrap_or(defaults.shard_prefix_len),
            slow_query_threshold: self
                .slow_query_threshold
                .unwrap_or(defaults.slow_query_threshold),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
        }
    }
}

/// Preset configurations for the portal's cache users
impl CacheConfig {
    /// Rendered list pages and fragments: short TTL
    pub fn pages() -> Self {
        Self {
            default_ttl: Duration::from_secs(300), // 5 minutes
            ttl_jitter: 0.1,
            ..Default::default()
        }
    }

    /// Fee and attendance reports: expensive to build, change slowly
    pub fn reports() -> Self {
        Self {
            default_ttl: Duration::from_secs(6 * 3600), // 6 hours
            max_size_bytes: 500 * 1024 * 1024,          // 500 MB
            ttl_jitter: 0.05,
            ..Default::default()
        }
    }

    /// Small hosts
    pub fn small() -> Self {
        Self {
            default_ttl: Duration::from_secs(1800), // 30 minutes
            max_size_bytes: 10 * 1024 * 1024,       // 10 MB
            ..Default::default()
        }
    }
}
