//! Demonstrates query caching for portal pages
//!
//! This example shows how to:
//! - Memoize a query result keyed by SQL and parameters
//! - Drop cached queries when a table changes
//! - Inspect cache statistics

use portal_cache::cache::{CacheConfig, CacheInvalidator, FileCache, QueryCache};
use std::sync::Arc;
use std::time::Duration;

fn load_class(class: &str) -> Result<Vec<String>, std::io::Error> {
    // Stand-in for a database round trip
    std::thread::sleep(Duration::from_millis(200));
    Ok(vec![format!("{class}-01 Asha Rao"), format!("{class}-02 Ben Okafor")])
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let dir = std::env::temp_dir().join("portal-cache-demo");
    let config = CacheConfig::builder()
        .cache_dir(&dir)
        .slow_query_threshold(Duration::from_millis(100))
        .build();

    let cache = Arc::new(FileCache::new(config)?);
    let queries = QueryCache::new(cache.clone());
    println!("✓ Cache at {}\n", dir.display());

    let sql = "SELECT roll_no, name FROM students WHERE class = ?";

    // 1. First fetch runs the query
    println!("1. Loading class 7B...");
    let rows = queries.fetch(sql, &["7B"], Duration::from_secs(300), || load_class("7B"))?;
    println!("   {} rows", rows.len());

    // 2. Second fetch is served from disk
    println!("2. Loading class 7B again...");
    let rows: Vec<String> =
        queries.fetch(sql, &["7B"], Duration::from_secs(300), || load_class("7B"))?;
    println!("   {} rows (cached)", rows.len());

    // 3. A student record changes
    println!("3. Invalidating table students...");
    let removed = queries.invalidate_table("students");
    println!("   Removed {} cached queries", removed);

    println!("\n{}", cache.stats());

    cache.clear();
    Ok(())
}
