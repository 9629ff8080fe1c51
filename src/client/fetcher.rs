//! Single-namespace pull.
//!
//! # Flow
//! ```text
//! cache key → previous token (fetch cache)
//!     → acquire "{cache key}:lock" (bounded by pull timeout)
//!         timeout → durable slot → empty
//!     → last-good slot fresh? reuse it (another worker just pulled)
//!     → signed GET ?ip&cluster&namespace&version&refreshKey
//!         200 + JSON, same token → cached payload
//!         200 + JSON, new token  → adopt, write fetch cache + both slots
//!         304 / other / error    → cached payload → durable slot → empty
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheEntry, FetchCache, PersistenceRecord, PersistenceStore};
use crate::client::options::{canonical_query, ClientOptions};
use crate::client::signer::{timestamp_millis, RequestSigner};
use crate::client::transport::{TransportError, TransportFactory, TransportResponse};
use crate::client::types::{ConfigurationMap, PullResponse};
use crate::lock::DistributedLock;
use crate::observability::metrics::{self, FetchOutcome};

/// Failures that have no fallback inside the fetcher itself.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("namespace '{namespace}': {source}")]
    InvalidClient {
        namespace: String,
        #[source]
        source: TransportError,
    },
}

/// Performs one namespace's long-poll round trip with cache and lock handling.
pub struct NamespaceFetcher {
    options: ClientOptions,
    signer: RequestSigner,
    transport: TransportFactory,
    cache: FetchCache,
    persistence: PersistenceStore,
    lock: Arc<dyn DistributedLock>,
    pull_timeout: Duration,
    refresh_interval: Duration,
}

impl NamespaceFetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: ClientOptions,
        signer: RequestSigner,
        transport: TransportFactory,
        cache: FetchCache,
        persistence: PersistenceStore,
        lock: Arc<dyn DistributedLock>,
        pull_timeout: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            options,
            signer,
            transport,
            cache,
            persistence,
            lock,
            pull_timeout,
            refresh_interval,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Resolve the current configuration of `namespace`.
    ///
    /// Upstream and lock failures degrade to cached data; only a broken
    /// transport factory is reported.
    pub async fn fetch(&self, namespace: &str) -> Result<ConfigurationMap, FetchError> {
        let cache_key = self.options.build_cache_key(namespace);
        let last_token = self.cache.token(&cache_key);
        let lock_key = format!("{cache_key}:lock");

        let _guard = match self.lock.acquire(&lock_key, self.pull_timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(namespace, cache_key = %cache_key, error = %e, "Connect to config server failed: lock not acquired");
                metrics::record_lock_timeout(namespace);
                metrics::record_fetch(namespace, FetchOutcome::Fallback);
                return Ok(self.durable_or_empty(namespace, &cache_key).await);
            }
        };

        match self.persistence.last_good(&cache_key).await {
            Ok(Some(record)) => {
                tracing::debug!(namespace, token = %record.refresh_key, "Reusing configuration refreshed by another worker");
                if !record.refresh_key.is_empty() {
                    self.cache.put(
                        &cache_key,
                        CacheEntry {
                            change_token: record.refresh_key,
                            configurations: record.configurations.clone(),
                        },
                    );
                }
                metrics::record_fetch(namespace, FetchOutcome::Shared);
                return Ok(record.configurations);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(namespace, error = %e, "Ignoring unreadable last-good record"),
        }

        let transport = (self.transport)().map_err(|source| FetchError::InvalidClient {
            namespace: namespace.to_string(),
            source,
        })?;

        let query = self.options.query(namespace, &last_token);
        let timestamp = timestamp_millis();
        let mut headers = Vec::with_capacity(2);
        if let Some(authorization) = self.signer.sign(&timestamp, &canonical_query(&query)) {
            headers.push(("Authorization", authorization));
        }
        headers.push(("Timestamp", timestamp));

        match transport.get(self.options.base_url(), &query, &headers).await {
            Ok(response) if response.status == 200 && response.is_json() => {
                match serde_json::from_str::<PullResponse>(&response.body) {
                    Ok(body) => Ok(self.accept(namespace, &cache_key, &last_token, body).await),
                    Err(e) => {
                        tracing::error!(namespace, error = %e, "Connect to config server failed: undecodable body");
                        Ok(self.fallback(namespace).await)
                    }
                }
            }
            Ok(response) => {
                self.log_unusable(namespace, &response);
                Ok(self.fallback(namespace).await)
            }
            Err(e) => {
                tracing::error!(namespace, error = %e, "Connect to config server failed");
                Ok(self.fallback(namespace).await)
            }
        }
    }

    /// Last payload this process accepted, else the durable slot, else empty.
    pub async fn fallback(&self, namespace: &str) -> ConfigurationMap {
        metrics::record_fetch(namespace, FetchOutcome::Fallback);
        let cache_key = self.options.build_cache_key(namespace);
        match self.cache.get(&cache_key) {
            Some(entry) => entry.configurations,
            None => self.durable_or_empty(namespace, &cache_key).await,
        }
    }

    async fn accept(
        &self,
        namespace: &str,
        cache_key: &str,
        last_token: &str,
        body: PullResponse,
    ) -> ConfigurationMap {
        let cached = self
            .cache
            .get(cache_key)
            .filter(|entry| entry.change_token == last_token);

        let configurations = match cached {
            Some(entry) if body.refresh_key == last_token => {
                metrics::record_fetch(namespace, FetchOutcome::Unchanged);
                entry.configurations
            }
            _ => {
                if body.refresh_key == last_token {
                    tracing::warn!(namespace, token = %last_token, "Server repeated the token but nothing is cached; adopting response payload");
                } else {
                    tracing::info!(namespace, token = %body.refresh_key, "Namespace configuration changed");
                }
                self.cache.put(
                    cache_key,
                    CacheEntry {
                        change_token: body.refresh_key.clone(),
                        configurations: body.configurations.clone(),
                    },
                );
                metrics::record_fetch(namespace, FetchOutcome::Updated);
                body.configurations
            }
        };

        let record = PersistenceRecord {
            refresh_key: body.refresh_key,
            configurations: configurations.clone(),
        };
        if let Err(e) = self
            .persistence
            .store(cache_key, &record, self.refresh_interval)
            .await
        {
            tracing::warn!(namespace, error = %e, "Failed to persist namespace configuration");
        }
        configurations
    }

    async fn durable_or_empty(&self, namespace: &str, cache_key: &str) -> ConfigurationMap {
        match self.persistence.durable(cache_key).await {
            Ok(Some(record)) => record.configurations,
            Ok(None) => ConfigurationMap::new(),
            Err(e) => {
                tracing::error!(namespace, error = %e, "Durable fallback unreadable");
                ConfigurationMap::new()
            }
        }
    }

    fn log_unusable(&self, namespace: &str, response: &TransportResponse) {
        if response.status == 304 {
            tracing::debug!(namespace, "Configuration not modified");
        } else {
            tracing::error!(
                namespace,
                status = response.status,
                content_type = %response.content_type,
                "Connect to config server failed"
            );
        }
    }
}

impl std::fmt::Debug for NamespaceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceFetcher")
            .field("server", &self.options.server)
            .field("pull_timeout", &self.pull_timeout)
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::{KvStore, MemoryKvStore};
    use crate::client::transport::{shared_factory, ConfigTransport};
    use crate::lock::LocalLock;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted responses and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<Vec<Result<TransportResponse, TransportError>>>,
        pub(crate) requests: Mutex<Vec<(Vec<(&'static str, String)>, Vec<(&'static str, String)>)>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) delay: Duration,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Result<TransportResponse, TransportError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                ..Self::default()
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl ConfigTransport for ScriptedTransport {
        async fn get(
            &self,
            _url: &str,
            query: &[(&'static str, String)],
            headers: &[(&'static str, String)],
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((query.to_vec(), headers.to_vec()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(TransportError::Request("script exhausted".into())))
        }
    }

    pub(crate) fn json_response(token: &str, configurations: serde_json::Value) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            content_type: "application/json".into(),
            body: json!({ "refreshKey": token, "configurations": configurations }).to_string(),
        })
    }

    pub(crate) fn status(code: u16) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: code,
            content_type: "text/plain".into(),
            body: String::new(),
        })
    }

    pub(crate) fn options() -> ClientOptions {
        ClientOptions {
            server: "http://config.test/api/config/http".into(),
            app_id: "shop".into(),
            cluster: "prod".into(),
            client_ip: "10.0.0.7".into(),
            version: "1".into(),
        }
    }

    pub(crate) struct Harness {
        pub(crate) fetcher: NamespaceFetcher,
        pub(crate) transport: Arc<ScriptedTransport>,
        pub(crate) kv: MemoryKvStore,
        pub(crate) lock: LocalLock,
    }

    pub(crate) fn harness_with(transport: ScriptedTransport, kv: MemoryKvStore, lock: LocalLock, secret: &str) -> Harness {
        harness_refreshing(transport, kv, lock, secret, Duration::from_secs(60))
    }

    pub(crate) fn harness_refreshing(
        transport: ScriptedTransport,
        kv: MemoryKvStore,
        lock: LocalLock,
        secret: &str,
        refresh_interval: Duration,
    ) -> Harness {
        let transport = Arc::new(transport);
        let persistence = PersistenceStore::new(Arc::new(kv.clone()), "last", "durable");
        let fetcher = NamespaceFetcher::new(
            options(),
            RequestSigner::new("shop", secret),
            shared_factory(transport.clone()),
            FetchCache::new(),
            persistence,
            Arc::new(lock.clone()),
            Duration::from_millis(200),
            refresh_interval,
        );
        Harness { fetcher, transport, kv, lock }
    }

    pub(crate) fn harness(responses: Vec<Result<TransportResponse, TransportError>>) -> Harness {
        harness_with(ScriptedTransport::new(responses), MemoryKvStore::new(), LocalLock::new(), "")
    }

    fn map(value: serde_json::Value) -> ConfigurationMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => ConfigurationMap::new(),
        }
    }

    #[tokio::test]
    async fn test_new_token_is_adopted_and_persisted() {
        let h = harness(vec![json_response("v1", json!({"databases.default.host": "db1"}))]);
        let result = h.fetcher.fetch("databases").await.unwrap();
        assert_eq!(result, map(json!({"databases.default.host": "db1"})));

        let key = h.fetcher.options().build_cache_key("databases");
        assert_eq!(h.fetcher.cache().token(&key), "v1");
        assert!(h.kv.get(&format!("last_{key}")).await.unwrap().is_some());
        assert!(h.kv.get(&format!("durable_{key}")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_query_carries_previous_token() {
        let h = harness(vec![
            json_response("v1", json!({"redis.default.host": "r1"})),
            json_response("v1", json!({})),
        ]);
        h.fetcher.fetch("redis").await.unwrap();
        let key = h.fetcher.options().build_cache_key("redis");
        h.kv.remove(&format!("last_{key}"));
        h.fetcher.fetch("redis").await.unwrap();

        let requests = h.transport.requests.lock().unwrap();
        let tokens: Vec<_> = requests
            .iter()
            .map(|(query, _)| query.iter().find(|(k, _)| *k == "refreshKey").unwrap().1.clone())
            .collect();
        assert_eq!(tokens, vec!["".to_string(), "v1".to_string()]);
        assert_eq!(requests[0].0[2], ("namespace", "redis".to_string()));
    }

    #[tokio::test]
    async fn test_same_token_reuses_cached_payload_verbatim() {
        let h = harness(vec![
            json_response("v1", json!({"redis.default.host": "r1"})),
            json_response("v1", json!({"redis.default.host": "BOGUS"})),
        ]);
        let first = h.fetcher.fetch("redis").await.unwrap();
        let key = h.fetcher.options().build_cache_key("redis");
        h.kv.remove(&format!("last_{key}"));

        let second = h.fetcher.fetch("redis").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_token_without_cache_adopts_body() {
        let h = harness(vec![json_response("", json!({"redis.default.host": "r1"}))]);
        let result = h.fetcher.fetch("redis").await.unwrap();
        assert_eq!(result, map(json!({"redis.default.host": "r1"})));
    }

    #[tokio::test]
    async fn test_fresh_last_good_skips_http() {
        let h = harness(vec![]);
        let key = h.fetcher.options().build_cache_key("redis");
        let record = PersistenceRecord {
            refresh_key: "v9".into(),
            configurations: map(json!({"redis.default.host": "shared"})),
        };
        PersistenceStore::new(Arc::new(h.kv.clone()), "last", "durable")
            .store(&key, &record, Duration::from_secs(60))
            .await
            .unwrap();

        let result = h.fetcher.fetch("redis").await.unwrap();
        assert_eq!(result, record.configurations);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.fetcher.cache().token(&key), "v9");
    }

    #[tokio::test]
    async fn test_not_modified_returns_cached() {
        let h = harness(vec![
            json_response("v1", json!({"redis.default.host": "r1"})),
            status(304),
        ]);
        let first = h.fetcher.fetch("redis").await.unwrap();
        let key = h.fetcher.options().build_cache_key("redis");
        h.kv.remove(&format!("last_{key}"));
        assert_eq!(h.fetcher.fetch("redis").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_failure_without_cache_uses_durable_then_empty() {
        let kv = MemoryKvStore::new();
        let h = harness_with(
            ScriptedTransport::new(vec![status(500), Err(TransportError::Request("refused".into()))]),
            kv.clone(),
            LocalLock::new(),
            "",
        );
        let key = h.fetcher.options().build_cache_key("databases");
        let durable = PersistenceRecord {
            refresh_key: "v0".into(),
            configurations: map(json!({"databases.default.host": "db0"})),
        };
        kv.set(&format!("durable_{key}"), serde_json::to_string(&durable).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(h.fetcher.fetch("databases").await.unwrap(), durable.configurations);

        kv.remove(&format!("durable_{key}"));
        assert!(h.fetcher.fetch("databases").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_json_200_falls_back() {
        let h = harness(vec![Ok(TransportResponse {
            status: 200,
            content_type: "text/html".into(),
            body: "<html>".into(),
        })]);
        assert!(h.fetcher.fetch("redis").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_timeout_reads_durable_slot() {
        let h = harness(vec![json_response("v1", json!({"redis.default.host": "fresh"}))]);
        let key = h.fetcher.options().build_cache_key("redis");
        let durable = PersistenceRecord {
            refresh_key: "v0".into(),
            configurations: map(json!({"redis.default.host": "durable"})),
        };
        h.kv.set(&format!("durable_{key}"), serde_json::to_string(&durable).unwrap(), None)
            .await
            .unwrap();

        let _held = h.lock.acquire(&format!("{key}:lock"), Duration::from_secs(1)).await.unwrap();
        let result = h.fetcher.fetch("redis").await.unwrap();
        assert_eq!(result, durable.configurations);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lock_timeout_without_durable_slot_is_empty() {
        let h = harness(vec![json_response("v1", json!({"redis.default.host": "fresh"}))]);
        let key = h.fetcher.options().build_cache_key("redis");

        let _held = h.lock.acquire(&format!("{key}:lock"), Duration::from_secs(1)).await.unwrap();
        let result = h.fetcher.fetch("redis").await;
        assert!(result.unwrap().is_empty());
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_signed_request_headers() {
        let h = harness_with(
            ScriptedTransport::new(vec![json_response("v1", json!({}))]),
            MemoryKvStore::new(),
            LocalLock::new(),
            "s3cr3t",
        );
        h.fetcher.fetch("redis").await.unwrap();

        let requests = h.transport.requests.lock().unwrap();
        let (query, headers) = &requests[0];
        let timestamp = &headers.iter().find(|(k, _)| *k == "Timestamp").unwrap().1;
        let authorization = &headers.iter().find(|(k, _)| *k == "Authorization").unwrap().1;
        let expected = RequestSigner::new("shop", "s3cr3t")
            .sign(timestamp, &canonical_query(query))
            .unwrap();
        assert_eq!(authorization, &expected);
    }

    #[tokio::test]
    async fn test_unsigned_request_omits_authorization() {
        let h = harness(vec![json_response("v1", json!({}))]);
        h.fetcher.fetch("redis").await.unwrap();
        let requests = h.transport.requests.lock().unwrap();
        assert!(requests[0].1.iter().all(|(k, _)| *k != "Authorization"));
        assert!(requests[0].1.iter().any(|(k, _)| *k == "Timestamp"));
    }

    #[tokio::test]
    async fn test_broken_factory_is_reported() {
        let persistence = PersistenceStore::new(Arc::new(MemoryKvStore::new()), "last", "durable");
        let factory: TransportFactory =
            Arc::new(|| Err(TransportError::InvalidClient("no tls backend".into())));
        let fetcher = NamespaceFetcher::new(
            options(),
            RequestSigner::new("shop", ""),
            factory,
            FetchCache::new(),
            persistence,
            Arc::new(LocalLock::new()),
            Duration::from_millis(100),
            Duration::from_secs(60),
        );
        let err = fetcher.fetch("redis").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidClient { .. }));
    }
}
