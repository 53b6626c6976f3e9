//! Reasons entries leave the cache, and the trait write paths invalidate through

use serde::{Deserialize, Serialize};

/// Reason for removing an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Entry expired based on TTL
    Expired,

    /// Explicit delete by key
    Manual,

    /// Invalidated through one of its tags
    TagMatch { tag: String },

    /// Removed by the size sweep
    SizeLimit,

    /// Entry file could not be read or decoded
    Corrupt,

    /// Whole store cleared
    Cleared,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::TagMatch { tag } => write!(f, "tag match: {}", tag),
            InvalidationReason::SizeLimit => write!(f, "cache size limit reached"),
            InvalidationReason::Corrupt => write!(f, "unreadable entry"),
            InvalidationReason::Cleared => write!(f, "cache cleared"),
        }
    }
}

/// Something that drops cached data when the tables behind it change
///
/// Write paths (saving a student, recording a fee payment) hold one of these
/// and call `invalidate_table` after committing.
pub trait CacheInvalidator: Send + Sync {
    /// Invalidate every cached query that read from `table_name`,
    /// returning the number of entries removed
    fn invalidate_table(&self, table_name: &str) -> usize;

    /// Invalidate all cache entries
    fn invalidate_all(&self) -> usize;

    /// Check if the invalidator is enabled
    fn is_enabled(&self) -> bool;
}

/// Invalidator for code paths running without a cache
#[derive(Debug, Default, Clone)]
pub struct NoOpInvalidator;

impl CacheInvalidator for NoOpInvalidator {
    fn invalidate_table(&self, _table_name: &str) -> usize {
        0
    }

    fn invalidate_all(&self) -> usize {
        0
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Tag name under which queries reading `table_name` are filed
pub fn table_tag(table_name: &str) -> String {
    format!("table_{}", table_name.to_ascii_lowercase())
}
