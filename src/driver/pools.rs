//! Connection pools that follow configuration changes.
//!
//! Each supported namespace registers a [`PoolInvalidator`]. When a key under
//! `{namespace}.{pool}` changes, the apply pipeline calls
//! `clear_pool(pool)` so the next checkout rebuilds from the new values.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use crate::driver::store::ConfigStore;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no configuration for pool '{namespace}.{name}'")]
    NotConfigured { namespace: String, name: String },

    #[error("cannot build pool '{namespace}.{name}': {reason}")]
    Build {
        namespace: String,
        name: String,
        reason: String,
    },
}

/// A pooled resource that can drop its connections.
pub trait Pool: Send + Sync {
    fn flush(&self);
}

/// The capability the apply pipeline needs from a namespace's pool factory.
pub trait PoolInvalidator: Send + Sync {
    fn clear_pool(&self, name: &str);
}

type Builder<P> = Box<dyn Fn(&str, &Value) -> Result<P, String> + Send + Sync>;

/// Named pools of one namespace, created lazily from the live store.
pub struct PoolFactory<P> {
    namespace: String,
    store: Arc<dyn ConfigStore>,
    builder: Builder<P>,
    pools: DashMap<String, Arc<P>>,
}

impl<P: Pool> PoolFactory<P> {
    /// `builder` receives the pool name and its `{namespace}.{name}` config.
    pub fn new<F>(namespace: impl Into<String>, store: Arc<dyn ConfigStore>, builder: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<P, String> + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.into(),
            store,
            builder: Box::new(builder),
            pools: DashMap::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Existing pool for `name`, or a new one built from the live store.
    pub fn get_pool(&self, name: &str) -> Result<Arc<P>, PoolError> {
        if let Some(pool) = self.pools.get(name) {
            return Ok(pool.clone());
        }

        let key = format!("{}.{}", self.namespace, name);
        if !self.store.has(&key) {
            return Err(PoolError::NotConfigured {
                namespace: self.namespace.clone(),
                name: name.to_string(),
            });
        }
        let config = self.store.get(&key).unwrap_or(Value::Null);
        let pool = (self.builder)(name, &config).map_err(|reason| PoolError::Build {
            namespace: self.namespace.clone(),
            name: name.to_string(),
            reason,
        })?;

        Ok(self
            .pools
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(pool))
            .clone())
    }

    /// Number of live pools.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<P: Pool> PoolInvalidator for PoolFactory<P> {
    fn clear_pool(&self, name: &str) {
        if let Some((_, pool)) = self.pools.remove(name) {
            pool.flush();
            tracing::info!(namespace = %self.namespace, pool = name, "Pool flushed after configuration change");
        }
    }
}

impl<P> std::fmt::Debug for PoolFactory<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolFactory")
            .field("namespace", &self.namespace)
            .field("pools", &self.pools.len())
            .finish()
    }
}

/// Namespace → pool factory. Its keys are the namespaces the driver recognises.
#[derive(Default, Clone)]
pub struct PoolRegistry {
    factories: BTreeMap<String, Arc<dyn PoolInvalidator>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace: impl Into<String>, factory: Arc<dyn PoolInvalidator>) {
        self.factories.insert(namespace.into(), factory);
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Split `key` into `(namespace, pool)` when it starts with a registered
    /// namespace (ASCII case-insensitive) followed by a pool name.
    /// Unmatched keys yield two empty strings.
    pub fn resolve(&self, key: &str) -> (String, String) {
        for namespace in self.factories.keys() {
            let len = namespace.len();
            let prefix_matches = key
                .get(..len)
                .is_some_and(|head| head.eq_ignore_ascii_case(namespace));
            if !prefix_matches || key.as_bytes().get(len) != Some(&b'.') {
                continue;
            }
            let pool = key[len + 1..].split('.').next().unwrap_or_default();
            if !pool.is_empty() {
                return (namespace.clone(), pool.to_string());
            }
        }
        (String::new(), String::new())
    }

    /// Invalidate `pool` in `namespace`. Returns whether a factory was found.
    pub fn clear(&self, namespace: &str, pool: &str) -> bool {
        match self.factories.get(namespace) {
            Some(factory) => {
                factory.clear_pool(pool);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}
