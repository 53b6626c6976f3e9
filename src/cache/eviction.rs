//! Size-bounded eviction
//!
//! After each write the store totals the size of its entry files. Once that
//! passes `max_size_bytes`, the oldest-modified files are deleted until the
//! total is at most `eviction_target_ratio * max_size_bytes`.
//!
//! The sweep is not synchronized with other writers. Two processes can sweep
//! at the same time, and the limit can be briefly exceeded between sweeps.

use crate::cache::{
    invalidation::InvalidationReason,
    store::{remove_if_exists, EntryFile, FileCache},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Entry files looked at
    pub scanned: usize,

    /// Entry files deleted
    pub removed: usize,

    /// Total entry size before the sweep
    pub bytes_before: u64,

    /// Total entry size after the sweep
    pub bytes_after: u64,
}

impl EvictionReport {
    pub fn evicted_anything(&self) -> bool {
        self.removed > 0
    }
}

/// Pick the files to delete so the total drops to `target_bytes`
///
/// Returns indices into `files`, oldest modification first (ties broken by
/// path). Returns nothing when the total is already within `max_bytes`.
pub(crate) fn plan_eviction(files: &[EntryFile], max_bytes: u64, target_bytes: u64) -> Vec<usize> {
    let mut total: u64 = files.iter().map(|f| f.size).sum();
    if total <= max_bytes {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..files.len()).collect();
    order.sort_by(|&a, &b| {
        files[a]
            .modified
            .cmp(&files[b].modified)
            .then_with(|| files[a].path.cmp(&files[b].path))
    });

    let mut victims = Vec::new();
    for idx in order {
        if total <= target_bytes {
            break;
        }
        total = total.saturating_sub(files[idx].size);
        victims.push(idx);
    }
    victims
}

impl FileCache {
    /// Run the size sweep now
    pub fn evict_to_limit(&self) -> EvictionReport {
        let files = self.scan_entries();
        let bytes_before: u64 = files.iter().map(|f| f.size).sum();

        let mut report = EvictionReport {
            scanned: files.len(),
            removed: 0,
            bytes_before,
            bytes_after: bytes_before,
        };

        let max_bytes = self.config.max_size_bytes;
        if max_bytes == 0 {
            return report;
        }

        let victims = plan_eviction(&files, max_bytes, self.config.eviction_target_bytes());
        for idx in victims {
            let file = &files[idx];
            match remove_if_exists(&file.path) {
                Ok(removed) => {
                    if removed {
                        report.removed += 1;
                        debug!(
                            "Evicted {} ({})",
                            file.path.display(),
                            InvalidationReason::SizeLimit
                        );
                    }
                    // Gone either way, so it no longer counts.
                    report.bytes_after = report.bytes_after.saturating_sub(file.size);
                }
                Err(e) => warn!("Failed to evict {}: {}", file.path.display(), e),
            }
        }

        if report.evicted_anything() {
            if self.config.enable_metrics {
                self.counters().record_evictions(report.removed as u64);
            }
            info!(
                removed = report.removed,
                bytes_before = report.bytes_before,
                bytes_after = report.bytes_after,
                max_bytes = max_bytes,
                "Evicted cache entries over size limit"
            );
        }

        report
    }
}
