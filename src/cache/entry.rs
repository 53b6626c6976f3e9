//! Cache entry with TTL metadata
//!
//! This is the record persisted to each entry file, serialized as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value with its expiry and hit counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The caller's key
    pub key: String,

    /// The cached value
    pub value: V,

    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,

    /// When the entry was written
    pub created_at: DateTime<Utc>,

    /// Number of successful reads
    #[serde(default)]
    pub hit_count: u64,
}

impl<V> CacheEntry<V> {
    /// Create an entry written at `now` that lives for `ttl`
    pub fn new(key: impl Into<String>, value: V, ttl: Duration, now: DateTime<Utc>) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            key: key.into(),
            value,
            expires_at,
            created_at: now,
            hit_count: 0,
        }
    }

    /// Check if the entry has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry
    pub fn time_until_expiration(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_expired(now) {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Record a read
    pub fn mark_hit(&mut self) {
        self.hit_count += 1;
    }
}

/// Expiry header of an entry, read without decoding the value
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EntryHeader {
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

impl EntryHeader {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
