//! Tag index: named groups of cache keys for bulk invalidation
//!
//! A tag record is a JSON file under `<cache_dir>/tags/` listing the keys
//! written with that tag. Records only reference entries by key. Deleting an
//! entry leaves its key in every tag that lists it, and invalidation skips
//! keys that are already gone.

use crate::cache::{
    invalidation::InvalidationReason,
    store::{hash_hex, read_json, remove_if_exists, write_atomic, FileCache, TAGS_DIR, TAG_EXT},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Persisted key set of one tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Tag name
    pub tag: String,

    /// Keys written with this tag, in first-write order
    pub keys: Vec<String>,
}

impl TagRecord {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            keys: Vec::new(),
        }
    }

    /// Add a key unless already listed; returns whether it was added
    pub fn add_key(&mut self, key: &str) -> bool {
        if self.keys.iter().any(|k| k == key) {
            false
        } else {
            self.keys.push(key.to_string());
            true
        }
    }
}

impl FileCache {
    /// Location of the record for `tag`
    pub fn tag_path(&self, tag: &str) -> PathBuf {
        self.root()
            .join(TAGS_DIR)
            .join(format!("{}.{}", hash_hex(tag), TAG_EXT))
    }

    /// Store `value` under `key` and list the key under every tag
    ///
    /// Returns `false` if the entry itself could not be written; tags are
    /// then left untouched. A tag that fails to update is logged only.
    pub fn set_with_tags<V, S>(&self, key: &str, value: &V, tags: &[S], ttl: Duration) -> bool
    where
        V: Serialize,
        S: AsRef<str>,
    {
        if !self.set(key, value, ttl) {
            return false;
        }

        for tag in tags {
            let tag = tag.as_ref();
            if let Err(e) = self.add_key_to_tag(tag, key) {
                warn!("Failed to tag cache entry {} with {}: {}", key, tag, e);
            }
        }

        true
    }

    /// Keys currently listed under `tag`, possibly including stale ones
    pub fn tagged_keys(&self, tag: &str) -> Vec<String> {
        self.load_tag(tag).keys
    }

    /// Delete every entry listed under `tag`, then the tag record itself
    ///
    /// Returns the number of entries that were actually removed. Unknown tags
    /// and stale keys are not errors.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let record = self.load_tag(tag);
        let mut removed = 0;

        for key in &record.keys {
            match remove_if_exists(&self.entry_path(key)) {
                Ok(true) => removed += 1,
                Ok(false) => debug!("Tagged key already gone: {}", key),
                Err(e) => warn!("Failed to remove tagged entry {}: {}", key, e),
            }
        }

        if let Err(e) = remove_if_exists(&self.tag_path(tag)) {
            warn!("Failed to remove tag record {}: {}", tag, e);
        }

        if self.config.enable_metrics {
            self.counters().record_invalidations(removed as u64);
        }

        let reason = InvalidationReason::TagMatch {
            tag: tag.to_string(),
        };
        info!(
            "Invalidated {} of {} tagged entries ({})",
            removed,
            record.keys.len(),
            reason
        );
        removed
    }

    fn load_tag(&self, tag: &str) -> TagRecord {
        match read_json::<TagRecord>(&self.tag_path(tag)) {
            Ok(Some(record)) => record,
            Ok(None) => TagRecord::new(tag),
            Err(e) => {
                debug!("Unreadable tag record {}: {}", tag, e);
                TagRecord::new(tag)
            }
        }
    }

    fn add_key_to_tag(&self, tag: &str, key: &str) -> crate::error::Result<()> {
        let mut record = self.load_tag(tag);
        if !record.add_key(key) {
            return Ok(());
        }

        let bytes = serde_json::to_vec(&record)?;
        write_atomic(&self.tag_path(tag), &bytes)
    }
}
