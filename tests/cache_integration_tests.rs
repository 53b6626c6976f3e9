//! Integration tests for the cache module
//!
//! These tests verify the complete cache functionality including:
//! - Basic cache operations
//! - TTL expiration
//! - Tag invalidation
//! - Query memoization
//! - Size-bounded eviction

use chrono::{TimeZone, Utc};
use filetime::FileTime;
use portal_cache::cache::{
    query_key, CacheConfig, CacheInvalidator, CacheKeyBuilder, FileCache, KeyNamespace,
    ManualClock, NoOpInvalidator, QueryCache,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StudentRow {
    id: u32,
    name: String,
    class: String,
}

fn rows() -> Vec<StudentRow> {
    vec![
        StudentRow {
            id: 1,
            name: "Asha Rao".to_string(),
            class: "7B".to_string(),
        },
        StudentRow {
            id: 2,
            name: "Ben Okafor".to_string(),
            class: "7B".to_string(),
        },
    ]
}

fn open_with_clock(tmp: &TempDir) -> (FileCache, Arc<ManualClock>) {
    let start = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let config = CacheConfig::builder().cache_dir(tmp.path()).build();
    let cache = FileCache::with_clock(config, clock.clone()).unwrap();
    (cache, clock)
}

#[test]
fn test_set_then_get_returns_rows() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);

    assert!(cache.set("students_page_1", &rows(), Duration::from_secs(300)));

    let cached: Option<Vec<StudentRow>> = cache.get("students_page_1");
    assert_eq!(cached, Some(rows()));
}

#[test]
fn test_expired_after_ttl() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = open_with_clock(&tmp);

    cache.set("students_page_1", &rows(), Duration::from_secs(300));
    assert!(cache.has("students_page_1"));

    clock.advance(Duration::from_secs(301));

    assert_eq!(cache.get::<Vec<StudentRow>>("students_page_1"), None);
    assert!(!cache.has("students_page_1"));
    assert!(cache
        .get_or("students_page_1", Vec::<StudentRow>::new())
        .is_empty());
}

#[test]
fn test_still_live_at_ttl_boundary() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = open_with_clock(&tmp);

    cache.set("k", &true, Duration::from_secs(300));
    clock.advance(Duration::from_secs(300));
    assert_eq!(cache.get::<bool>("k"), Some(true));
}

#[test]
fn test_overwrite_replaces_value() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);

    cache.set("k", &vec![1, 2, 3], Duration::from_secs(60));
    cache.set("k", &vec![9], Duration::from_secs(60));

    assert_eq!(cache.get::<Vec<u32>>("k"), Some(vec![9]));
    assert_eq!(cache.stats().entries, 1);
}

#[test]
fn test_delete_missing_key_succeeds() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);

    assert!(cache.delete("never_written"));
}

#[test]
fn test_tag_invalidation_scenario() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);

    cache.set_with_tags("q1", &rows(), &["table_students"], Duration::from_secs(600));
    cache.set_with_tags("q2", &42u32, &["table_students"], Duration::from_secs(600));

    cache.invalidate_tag("table_students");

    assert_eq!(cache.get::<Vec<StudentRow>>("q1"), None);
    assert_eq!(cache.get::<u32>("q2"), None);
    assert!(!cache.has("q1"));
    assert!(!cache.has("q2"));
}

#[test]
fn test_remember_runs_compute_once() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);
    let calls = Cell::new(0);

    let compute = || {
        calls.set(calls.get() + 1);
        rows()
    };

    let first = cache.remember("class_7b", Duration::from_secs(300), compute);
    let second = cache.remember("class_7b", Duration::from_secs(300), compute);

    assert_eq!(first, second);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_remember_recomputes_after_expiry() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = open_with_clock(&tmp);
    let calls = Cell::new(0);

    let compute = || {
        calls.set(calls.get() + 1);
        calls.get()
    };

    assert_eq!(cache.remember("n", Duration::from_secs(10), compute), 1);
    clock.advance(Duration::from_secs(11));
    assert_eq!(cache.remember("n", Duration::from_secs(10), compute), 2);
}

#[test]
fn test_corrupt_files_never_surface() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);

    cache.set("report", &"ok", Duration::from_secs(60));
    let path = cache.entry_path("report");
    fs::write(&path, b"\x00\x01garbage").unwrap();

    assert!(!cache.has("report"));
    assert_eq!(cache.get::<String>("report"), None);
    assert!(!path.exists());

    // A fresh value can be written afterwards
    assert!(cache.set("report", &"again", Duration::from_secs(60)));
    assert_eq!(cache.get::<String>("report"), Some("again".to_string()));
}

#[test]
fn test_cleanup_and_stats() {
    let tmp = TempDir::new().unwrap();
    let (cache, clock) = open_with_clock(&tmp);

    cache.set("a", &1u8, Duration::from_secs(10));
    cache.set("b", &2u8, Duration::from_secs(10));
    cache.set_with_tags("c", &3u8, &["table_fees"], Duration::from_secs(1000));
    cache.get::<u8>("c");
    cache.get::<u8>("missing");

    clock.advance(Duration::from_secs(30));

    let stats = cache.stats();
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.expired_entries, 2);
    assert_eq!(stats.tags, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!(stats.size_bytes > 0);

    assert_eq!(cache.cleanup(), 2);

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.expired_entries, 0);
    assert_eq!(stats.expirations, 2);
}

#[test]
fn test_clear_removes_entries_and_tags() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);

    cache.set_with_tags("a", &1u8, &["table_students"], Duration::from_secs(60));
    cache.set("b", &2u8, Duration::from_secs(60));

    assert_eq!(cache.clear(), 2);

    let stats = cache.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.tags, 0);
    assert!(cache.tagged_keys("table_students").is_empty());
}

#[test]
fn test_cache_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let (cache, _) = open_with_clock(&tmp);
        cache.set_with_tags("q1", &rows(), &["table_students"], Duration::from_secs(600));
    }

    let (cache, _) = open_with_clock(&tmp);
    assert_eq!(cache.get::<Vec<StudentRow>>("q1"), Some(rows()));
    assert_eq!(cache.invalidate_tag("table_students"), 1);
}

#[test]
fn test_query_cache_table_invalidation() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);
    let queries = QueryCache::new(Arc::new(cache));
    let calls = Cell::new(0);

    let by_class = |class: &str| {
        queries.fetch(
            "SELECT id, name, class FROM students WHERE class = ?",
            &[class],
            Duration::from_secs(600),
            || {
                calls.set(calls.get() + 1);
                Ok::<_, std::io::Error>(rows())
            },
        )
    };
    let fees = || {
        queries.fetch(
            "SELECT SUM(amount) FROM fee_payments",
            &(),
            Duration::from_secs(600),
            || {
                calls.set(calls.get() + 1);
                Ok::<_, std::io::Error>(125_000u64)
            },
        )
    };

    by_class("7B").unwrap();
    by_class("7B").unwrap();
    by_class("8A").unwrap();
    fees().unwrap();
    assert_eq!(calls.get(), 3);

    // Saving a student drops only the student queries
    assert_eq!(queries.invalidate_table("students"), 2);
    fees().unwrap();
    assert_eq!(calls.get(), 3);
    by_class("7B").unwrap();
    assert_eq!(calls.get(), 4);
}

#[test]
fn test_query_key_distinguishes_params() {
    let sql = "SELECT * FROM attendance WHERE student_id = ? AND day = ?";
    let key = query_key(sql, &(1, "2026-01-05"));
    assert!(key.is_some());
    assert_ne!(key, query_key(sql, &(2, "2026-01-05")));
    assert_ne!(key, query_key(sql, &("2026-01-05", 1)));
}

#[test]
fn test_invalidator_trait_objects() {
    let tmp = TempDir::new().unwrap();
    let (cache, _) = open_with_clock(&tmp);
    let queries = QueryCache::new(Arc::new(cache));

    queries
        .fetch("SELECT * FROM teachers", &(), Duration::from_secs(60), || {
            Ok::<_, String>(vec!["Ms. Iyer".to_string()])
        })
        .unwrap();

    let invalidators: Vec<Box<dyn CacheInvalidator>> =
        vec![Box::new(NoOpInvalidator), Box::new(queries.clone())];
    let removed: usize = invalidators
        .iter()
        .filter(|i| i.is_enabled())
        .map(|i| i.invalidate_table("teachers"))
        .sum();
    assert_eq!(removed, 1);
}

#[test]
fn test_cache_key_builder() {
    let key = CacheKeyBuilder::new(KeyNamespace::Fragment)
        .identifier("class_dropdown")
        .param("school", 3)
        .build();
    assert_eq!(key, "fragment:class_dropdown?school=3");
}

/// Write `count` same-sized entries and back-date their mtimes, oldest first
fn seed_entries(cache: &FileCache, count: usize) -> (Vec<String>, u64) {
    let keys: Vec<String> = (0..count).map(|i| format!("page_{i}")).collect();
    let base = SystemTime::now() - Duration::from_secs(3600);

    for (i, key) in keys.iter().enumerate() {
        assert!(cache.set(key, &format!("value-{i}"), Duration::from_secs(600)));
        let mtime = FileTime::from_system_time(base + Duration::from_secs(i as u64 * 10));
        filetime::set_file_mtime(cache.entry_path(key), mtime).unwrap();
    }

    let size = fs::metadata(cache.entry_path(&keys[0])).unwrap().len();
    (keys, size)
}

#[test]
fn test_eviction_sweep_removes_oldest() {
    let tmp = TempDir::new().unwrap();
    let start = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));

    let seed = FileCache::with_clock(
        CacheConfig::builder()
            .cache_dir(tmp.path())
            .enable_size_eviction(false)
            .build(),
        clock.clone(),
    )
    .unwrap();
    let (keys, size) = seed_entries(&seed, 5);

    // 5 entries against room for 4.5: sweep down to 3.6, i.e. drop two
    let max = size * 9 / 2;
    let cache = FileCache::with_clock(
        CacheConfig::builder()
            .cache_dir(tmp.path())
            .max_size_bytes(max)
            .build(),
        clock,
    )
    .unwrap();

    let report = cache.evict_to_limit();
    assert_eq!(report.scanned, 5);
    assert_eq!(report.removed, 2);
    assert_eq!(report.bytes_before, size * 5);
    assert!(report.bytes_after <= cache.config().eviction_target_bytes());

    assert!(!cache.entry_path(&keys[0]).exists());
    assert!(!cache.entry_path(&keys[1]).exists());
    for key in &keys[2..] {
        assert!(cache.entry_path(key).exists());
    }
    assert_eq!(cache.stats().evictions, 2);
}

#[test]
fn test_eviction_runs_after_write() {
    let tmp = TempDir::new().unwrap();
    let (probe, clock) = open_with_clock(&tmp);
    probe.set("page_0", &"value-0", Duration::from_secs(600));
    let size = fs::metadata(probe.entry_path("page_0")).unwrap().len();
    probe.clear();

    // Room for 4 entries before the fifth write triggers a sweep
    let cache = FileCache::with_clock(
        CacheConfig::builder()
            .cache_dir(tmp.path())
            .max_size_bytes(size * 4)
            .build(),
        clock,
    )
    .unwrap();

    let (keys, _) = seed_entries(&cache, 4);
    assert_eq!(cache.stats().entries, 4);

    cache.set("page_9", &"value-9", Duration::from_secs(600));

    let stats = cache.stats();
    assert!(stats.size_bytes <= cache.config().eviction_target_bytes());
    assert!(cache.entry_path("page_9").exists());
    assert!(!cache.entry_path(&keys[0]).exists());
    assert!(!cache.entry_path(&keys[1]).exists());
}

#[test]
fn test_concurrent_cache_access() {
    let tmp = TempDir::new().unwrap();
    let config = CacheConfig::builder().cache_dir(tmp.path()).build();
    let cache = Arc::new(FileCache::new(config).unwrap());

    let mut handles = vec![];
    for i in 0..8 {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            for j in 0..10 {
                let key = format!("key_{}_{}", i, j);
                let value = format!("value_{}_{}", i, j);
                assert!(cache.set(&key, &value, Duration::from_secs(60)));
                assert_eq!(cache.get::<String>(&key), Some(value));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.entries, 80);
    assert_eq!(stats.hits, 80);
}
