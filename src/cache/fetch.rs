//! Process-local fetch cache.

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::types::ConfigurationMap;

/// A namespace payload together with the token it was issued under.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    pub change_token: String,
    pub configurations: ConfigurationMap,
}

/// Cache of the last accepted entry per cache key.
///
/// Entries are replaced whole, so a reader never sees a token from one
/// response paired with the payload of another.
#[derive(Debug, Clone, Default)]
pub struct FetchCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token held for `cache_key`, empty when nothing is cached.
    pub fn token(&self, cache_key: &str) -> String {
        self.inner
            .get(cache_key)
            .map(|entry| entry.change_token.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, cache_key: &str) -> Option<CacheEntry> {
        self.inner.get(cache_key).map(|entry| entry.value().clone())
    }

    /// Replace the entry for `cache_key`.
    pub fn put(&self, cache_key: &str, entry: CacheEntry) {
        self.inner.insert(cache_key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
