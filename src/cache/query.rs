//! Query result caching
//!
//! `QueryCache` memoizes data fetches behind keys derived from the query
//! itself. Results are tagged with the tables the query reads, so a write to
//! `students` can drop exactly the cached queries that read `students`.

use crate::cache::{
    invalidation::{table_tag, CacheInvalidator},
    store::{hash_hex, FileCache},
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Namespace prefix for readable cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyNamespace {
    /// Parameterized query result
    Query,

    /// Rendered list page
    Page,

    /// Rendered page fragment (widgets, dropdowns)
    Fragment,

    /// Aggregated report
    Report,

    /// Custom namespace
    Custom(String),
}

impl std::fmt::Display for KeyNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyNamespace::Query => write!(f, "query"),
            KeyNamespace::Page => write!(f, "page"),
            KeyNamespace::Fragment => write!(f, "fragment"),
            KeyNamespace::Report => write!(f, "report"),
            KeyNamespace::Custom(s) => write!(f, "custom:{}", s),
        }
    }
}

/// Builder for `namespace:identifier?k=v&...` keys
pub struct CacheKeyBuilder {
    namespace: KeyNamespace,
    identifier: String,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    pub fn new(namespace: KeyNamespace) -> Self {
        Self {
            namespace,
            identifier: String::new(),
            params: Vec::new(),
        }
    }

    /// Set the primary identifier
    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = id.into();
        self
    }

    /// Add a parameter; parameters keep the order they were added in
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn build(self) -> String {
        let mut key = format!("{}:{}", self.namespace, self.identifier);

        if !self.params.is_empty() {
            let params_str: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push_str(&format!("?{}", params_str.join("&")));
        }

        key
    }
}

/// Cache key for a query and its bound parameters
///
/// Hashes the SQL text followed by the JSON encoding of `params`. The
/// parameters are encoded in call order, so the same values bound in a
/// different order produce a different key. Returns `None` when `params`
/// has no JSON encoding (for example a map with non-string keys).
pub fn query_key<P: Serialize + ?Sized>(sql: &str, params: &P) -> Option<String> {
    let encoded = serde_json::to_string(params).ok()?;
    let mut material = String::with_capacity(sql.len() + encoded.len());
    material.push_str(sql);
    material.push_str(&encoded);
    Some(format!("query_{}", hash_hex(&material)))
}

const TABLE_KEYWORDS: [&str; 4] = ["from", "join", "into", "update"];

/// Tables named right after `FROM`, `JOIN`, `INTO` or `UPDATE`
///
/// Lower-cased, de-duplicated, in order of appearance. Schema prefixes are
/// dropped. Only the first table of a comma-separated `FROM` list is seen;
/// pass tables explicitly with `fetch_tagged` for such queries.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    let mut expect_table = false;

    for token in sql.split_whitespace() {
        if expect_table {
            expect_table = false;
            if let Some(name) = table_name(token) {
                if !tables.contains(&name) {
                    tables.push(name);
                }
                continue;
            }
        }

        if TABLE_KEYWORDS.iter().any(|k| token.eq_ignore_ascii_case(k)) {
            expect_table = true;
        }
    }

    tables
}

fn table_name(token: &str) -> Option<String> {
    let quoted = |c: char| matches!(c, '`' | '"' | '[' | ']' | ',' | ';' | ')');

    let head = token.split('(').next()?;
    let last = head.trim_matches(quoted).rsplit('.').next()?;
    let name = last.trim_matches(quoted);

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(name.to_ascii_lowercase())
}

/// Query cache facade over a shared `FileCache`
#[derive(Clone)]
pub struct QueryCache {
    cache: Arc<FileCache>,
}

impl QueryCache {
    pub fn new(cache: Arc<FileCache>) -> Self {
        Self { cache }
    }

    /// Get the underlying cache instance
    pub fn inner(&self) -> Arc<FileCache> {
        self.cache.clone()
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn remember<V, F>(&self, key: &str, ttl: Duration, compute: F) -> V
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> V,
    {
        self.cache.remember(key, ttl, compute)
    }

    /// Like `remember`, for computations that can fail
    pub fn try_remember<V, E, F>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<V, E>,
    {
        self.cache.try_remember(key, ttl, compute)
    }

    /// Run a query through the cache
    ///
    /// On a miss `compute` runs and its result is stored, tagged with every
    /// table `referenced_tables` finds in `sql`. Errors from `compute` are
    /// returned unchanged and nothing is cached.
    pub fn fetch<P, V, E, F>(&self, sql: &str, params: &P, ttl: Duration, compute: F) -> Result<V, E>
    where
        P: Serialize + ?Sized,
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<V, E>,
    {
        let tables = referenced_tables(sql);
        self.fetch_tagged(sql, params, &tables, ttl, compute)
    }

    /// Like `fetch`, with the tables to tag given explicitly
    ///
    /// Parameters without a JSON encoding cannot be keyed; `compute` then
    /// runs uncached.
    pub fn fetch_tagged<P, V, E, F, S>(
        &self,
        sql: &str,
        params: &P,
        tables: &[S],
        ttl: Duration,
        compute: F,
    ) -> Result<V, E>
    where
        P: Serialize + ?Sized,
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<V, E>,
        S: AsRef<str>,
    {
        let Some(key) = query_key(sql, params) else {
            debug!("Query parameters not encodable, bypassing cache: {}", sql);
            return compute();
        };

        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let started = Instant::now();
        let value = compute()?;
        self.cache.report_slow(&key, started.elapsed());

        let tags: Vec<String> = tables.iter().map(|t| table_tag(t.as_ref())).collect();
        if !self.cache.set_with_tags(&key, &value, &tags, ttl) {
            debug!("Query result not cached: {}", key);
        }

        Ok(value)
    }
}

impl CacheInvalidator for QueryCache {
    fn invalidate_table(&self, table_name: &str) -> usize {
        self.cache.invalidate_tag(&table_tag(table_name))
    }

    fn invalidate_all(&self) -> usize {
        self.cache.clear()
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
