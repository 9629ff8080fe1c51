//! Shared persistence of namespace payloads.
//!
//! Every worker with the same client identity reads and writes the same two
//! slots per cache key:
//! - `{last_prefix}_{cache_key}`: TTL'd "last good" record, proof that some
//!   worker refreshed the namespace within the current polling interval
//! - `{durable_prefix}_{cache_key}`: non-expiring fallback, read only when the
//!   namespace lock cannot be acquired in time

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::types::ConfigurationMap;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key/value backend error: {0}")]
    Backend(String),

    #[error("stored record for '{key}' is not valid: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key/value primitive shared between worker processes.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value`; `ttl = None` means the key never expires.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;
}

/// In-process [`KvStore`] honouring TTLs lazily on read.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<DashMap<String, (String, Option<Instant>)>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a key, expired or not.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            match entry.1 {
                Some(deadline) if now >= deadline => {}
                _ => return Ok(Some(entry.0.clone())),
            }
        } else {
            return Ok(None);
        }
        self.entries
            .remove_if(key, |_, (_, deadline)| deadline.is_some_and(|d| now >= d));
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), (value, deadline));
        Ok(())
    }
}

/// Persisted shape of a namespace payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceRecord {
    #[serde(default)]
    pub refresh_key: String,
    #[serde(default)]
    pub configurations: ConfigurationMap,
}

/// Accessor for the two persistence slots.
#[derive(Clone)]
pub struct PersistenceStore {
    backend: Arc<dyn KvStore>,
    last_prefix: String,
    durable_prefix: String,
}

impl PersistenceStore {
    pub fn new(
        backend: Arc<dyn KvStore>,
        last_prefix: impl Into<String>,
        durable_prefix: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            last_prefix: last_prefix.into(),
            durable_prefix: durable_prefix.into(),
        }
    }

    pub fn last_good_key(&self, cache_key: &str) -> String {
        format!("{}_{}", self.last_prefix, cache_key)
    }

    pub fn durable_key(&self, cache_key: &str) -> String {
        format!("{}_{}", self.durable_prefix, cache_key)
    }

    /// Record written within the current polling interval, if any.
    pub async fn last_good(&self, cache_key: &str) -> Result<Option<PersistenceRecord>, StoreError> {
        self.read(&self.last_good_key(cache_key)).await
    }

    /// Non-expiring fallback record, if any.
    pub async fn durable(&self, cache_key: &str) -> Result<Option<PersistenceRecord>, StoreError> {
        self.read(&self.durable_key(cache_key)).await
    }

    /// Refresh both slots. The durable slot is only written once the TTL'd
    /// write has succeeded.
    pub async fn store(
        &self,
        cache_key: &str,
        record: &PersistenceRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(record)?;
        self.backend
            .set(&self.last_good_key(cache_key), encoded.clone(), Some(ttl))
            .await?;
        self.backend
            .set(&self.durable_key(cache_key), encoded, None)
            .await
    }

    async fn read(&self, key: &str) -> Result<Option<PersistenceRecord>, StoreError> {
        match self.backend.get(key).await? {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                }),
        }
    }
}

impl std::fmt::Debug for PersistenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore")
            .field("last_prefix", &self.last_prefix)
            .field("durable_prefix", &self.durable_prefix)
            .finish()
    }
}
