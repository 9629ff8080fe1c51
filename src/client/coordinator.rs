//! Concurrent pull of every configured namespace.

use std::sync::Arc;

use futures_util::future::join_all;

use crate::client::fetcher::NamespaceFetcher;
use crate::client::types::Snapshot;

/// Fans namespace fetches out onto the runtime and joins them.
#[derive(Debug, Clone)]
pub struct PullCoordinator {
    fetcher: Arc<NamespaceFetcher>,
}

impl PullCoordinator {
    pub fn new(fetcher: Arc<NamespaceFetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Arc<NamespaceFetcher> {
        &self.fetcher
    }

    /// Fetch all `namespaces` concurrently.
    ///
    /// Returns only after every fetch has resolved. A fetch that fails or
    /// panics is replaced by that namespace's fallback payload; it never
    /// aborts its siblings.
    pub async fn pull_all(&self, namespaces: &[String]) -> Snapshot {
        let handles = namespaces.iter().map(|namespace| {
            let fetcher = self.fetcher.clone();
            let namespace = namespace.clone();
            tokio::spawn(async move { fetcher.fetch(&namespace).await })
        });
        let results = join_all(handles).await;

        let mut snapshot = Snapshot::new();
        for (namespace, result) in namespaces.iter().zip(results) {
            let configurations = match result {
                Ok(Ok(configurations)) => configurations,
                Ok(Err(e)) => {
                    tracing::error!(namespace = %namespace, error = %e, "Namespace fetch failed");
                    self.fetcher.fallback(namespace).await
                }
                Err(e) => {
                    tracing::error!(namespace = %namespace, error = %e, "Namespace fetch task aborted");
                    self.fetcher.fallback(namespace).await
                }
            };
            snapshot.insert(namespace.clone(), configurations);
        }
        snapshot
    }
}
