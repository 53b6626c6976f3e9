//! # File-Backed Query Cache
//!
//! Caches query results and rendered fragments on local disk.
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: entries are dropped lazily on the first read after expiry
//! - **Hash Sharding**: one JSON file per key, spread over `<prefix>/` directories
//! - **Tag Invalidation**: group keys under tags such as `table_students` and drop them together
//! - **Query Memoization**: keys derived from SQL text plus bound parameters
//! - **Size-Bounded Eviction**: oldest-modified entries go first once the store is over its limit
//! - **Fail-Open**: store faults degrade to cache misses, never to errors
//!
//! ## Example
//!
//! ```no_run
//! use portal_cache::cache::{CacheConfig, FileCache};
//! use std::time::Duration;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .cache_dir("/var/cache/portal")
//!     .max_size_bytes(100 * 1024 * 1024) // 100 MB
//!     .build();
//!
//! let cache = FileCache::new(config)?;
//!
//! cache.set_with_tags(
//!     "students_page_1",
//!     &vec!["Asha", "Ben"],
//!     &["table_students"],
//!     Duration::from_secs(300),
//! );
//!
//! if let Some(rows) = cache.get::<Vec<String>>("students_page_1") {
//!     println!("Cache hit: {:?}", rows);
//! }
//!
//! // A student record changed
//! cache.invalidate_tag("table_students");
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod entry;
pub mod eviction;
pub mod invalidation;
pub mod query;
pub mod store;
pub mod tags;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use eviction::EvictionReport;
pub use invalidation::{table_tag, CacheInvalidator, InvalidationReason, NoOpInvalidator};
pub use query::{query_key, referenced_tables, CacheKeyBuilder, KeyNamespace, QueryCache};
pub use store::FileCache;
pub use tags::TagRecord;
pub use types::CacheStats;
