//! Error types for cache operations
//!
//! Most of these never reach callers of the cache itself: store, tag and
//! query operations degrade to a miss instead. They surface from
//! configuration and start-up paths, and from the internal helpers that the
//! public operations are built on.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem error while reading or writing the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key that cannot be stored (empty)
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}
