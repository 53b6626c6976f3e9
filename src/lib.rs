//! # portal-cache
//!
//! File-backed cache for the school portal's database queries and rendered
//! fragments.
//!
//! ## Features
//!
//! - Key/value store on local disk with TTL expiry and per-entry hit counters
//! - Tag index for bulk invalidation (`table_students`, `table_fees`, ...)
//! - Query facade that keys results by SQL text and bound parameters
//! - Size-bounded eviction, oldest entries first
//! - Cache faults degrade to misses; errors from the wrapped fetch propagate
//!
//! ## Query Caching
//!
//! Build the cache once at start-up and share it.
//!
//! ```no_run
//! use portal_cache::{CacheConfig, CacheInvalidator, FileCache, QueryCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn load_students(class_id: u32) -> Result<Vec<String>, std::io::Error> {
//!     // database call
//!     Ok(vec![format!("student of class {class_id}")])
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let cache = Arc::new(FileCache::new(CacheConfig::from_env()?)?);
//!     let queries = QueryCache::new(cache.clone());
//!
//!     let rows = queries.fetch(
//!         "SELECT name FROM students WHERE class_id = ?",
//!         &[7],
//!         Duration::from_secs(300),
//!         || load_students(7),
//!     )?;
//!     println!("{} students", rows.len());
//!
//!     // After saving a student record
//!     queries.invalidate_table("students");
//!     Ok(())
//! }
//! ```
//!
//! ## Memoizing Anything
//!
//! ```no_run
//! use portal_cache::{CacheConfig, FileCache};
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cache = FileCache::new(CacheConfig::default())?;
//! let total: u64 = cache.remember("fees_collected_2026", Duration::from_secs(3600), || {
//!     // expensive aggregate
//!     1_250_000
//! });
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEntry, CacheInvalidator, CacheKeyBuilder, CacheStats,
    Clock, EvictionReport, FileCache, InvalidationReason, KeyNamespace, ManualClock,
    NoOpInvalidator, QueryCache, SystemClock, TagRecord,
};
pub use error::{CacheError, Result};
