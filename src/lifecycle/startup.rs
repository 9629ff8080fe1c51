//! Startup orchestration: wires the client, caches and driver together.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::{FetchCache, KvStore, MemoryKvStore, PersistenceStore};
use crate::client::{ClientOptions, NamespaceFetcher, PullCoordinator, ReqwestTransport, RequestSigner, TransportError, TransportFactory};
use crate::config::SyncConfig;
use crate::driver::{
    load_templates, ConfigApplyPipeline, ConfigStore, Driver, PoolRegistry, ProcessBroadcaster,
    PullLoop, SiblingChannel, TemplateError, ValueFormatter,
};
use crate::lock::{DistributedLock, LocalLock};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot create http client: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// External systems the sync client consumes.
pub struct Collaborators {
    pub kv: Arc<dyn KvStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub store: Arc<dyn ConfigStore>,
    pub pools: PoolRegistry,
    pub siblings: Vec<Arc<dyn SiblingChannel>>,
    pub worker_id: u32,
    /// `None` means a `reqwest` client bounded by `client.request_timeout_secs`.
    pub transport: Option<TransportFactory>,
}

impl Collaborators {
    /// Single-process setup: host-local lock and key/value store, no siblings.
    pub fn local(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            kv: Arc::new(MemoryKvStore::new()),
            lock: Arc::new(LocalLock::new()),
            store,
            pools: PoolRegistry::new(),
            siblings: Vec::new(),
            worker_id: std::process::id(),
            transport: None,
        }
    }
}

/// Everything a running client needs.
#[derive(Debug)]
pub struct Components {
    pub pull_loop: PullLoop,
    pub driver: Arc<Driver>,
}

/// Build the pull loop and driver from validated configuration.
pub fn build(config: &SyncConfig, collaborators: Collaborators) -> Result<Components, StartupError> {
    let Collaborators {
        kv,
        lock,
        store,
        pools,
        siblings,
        worker_id,
        transport,
    } = collaborators;

    let transport = match transport {
        Some(factory) => factory,
        None => ReqwestTransport::factory(config.client.request_timeout())?,
    };

    let driver_config = &config.driver;
    let persistence = PersistenceStore::new(
        kv,
        driver_config.last_persistence_key.clone(),
        driver_config.persistence_key.clone(),
    );
    let options = ClientOptions::from_config(&config.client);
    tracing::info!(
        server = %options.server,
        cluster = %options.cluster,
        client_ip = %options.client_ip,
        "Config client initialized"
    );
    let fetcher = NamespaceFetcher::new(
        options,
        RequestSigner::new(config.client.app_id.clone(), config.client.secret.clone()),
        transport,
        FetchCache::new(),
        persistence,
        lock,
        driver_config.pull_timeout(),
        driver_config.interval(),
    );

    let templates = if driver_config.template_dir.is_empty() {
        Default::default()
    } else if pools.namespaces().is_empty() {
        tracing::warn!(
            template_dir = %driver_config.template_dir,
            "No pool factories registered; value templates are not loaded"
        );
        Default::default()
    } else {
        load_templates(Path::new(&driver_config.template_dir), &pools.namespaces())?
    };
    let formatter = ValueFormatter::new(driver_config.strict_mode, templates);
    let pipeline = ConfigApplyPipeline::new(store, Arc::new(pools), formatter);
    let driver = Arc::new(Driver::new(
        pipeline,
        ProcessBroadcaster::new(worker_id, siblings),
    ));

    let pull_loop = PullLoop::new(
        PullCoordinator::new(Arc::new(fetcher)),
        driver.clone(),
        driver_config.namespaces.clone(),
        driver_config.chunk_size,
        driver_config.interval(),
    );

    Ok(Components { pull_loop, driver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryConfigStore;

    #[test]
    fn test_build_with_defaults() {
        let config = SyncConfig::default();
        let components = build(&config, Collaborators::local(Arc::new(MemoryConfigStore::new()))).unwrap();
        assert!(components.pull_loop.previous().is_none());
    }

    #[test]
    fn test_bad_template_dir_contents_fail_startup() {
        let dir = std::env::temp_dir().join(format!("config-sync-startup-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("redis.toml"), "= broken").unwrap();

        let mut config = SyncConfig::default();
        config.driver.template_dir = dir.display().to_string();
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let mut collaborators = Collaborators::local(store);
        collaborators.pools.register("redis", Arc::new(crate::driver::pools::tests::RecordingInvalidator::default()));

        assert!(matches!(build(&config, collaborators), Err(StartupError::Template(_))));
        std::fs::remove_dir_all(&dir).unwrap_or_default();
    }

    #[test]
    fn test_templates_skipped_without_registered_pools() {
        let dir = std::env::temp_dir().join(format!("config-sync-no-pools-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("redis.toml"), "= broken").unwrap();

        let mut config = SyncConfig::default();
        config.driver.template_dir = dir.display().to_string();
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());

        assert!(build(&config, Collaborators::local(store)).is_ok());
        std::fs::remove_dir_all(&dir).unwrap_or_default();
    }
}
