//! Change application.
//!
//! # Flow per chunk
//! ```text
//! flatten namespaces (later wins on key collision)
//!     → for each key, in order:
//!         resolve (namespace, pool)
//!         format value (template merge, strict coercion)
//!         equal to live value? skip
//!         write live store → clear pool → log
//! ```
//!
//! Keys are independent: a failed write is reported and the rest continue.

use std::sync::Arc;

use serde_json::Value;

use crate::client::types::{ConfigurationMap, Snapshot};
use crate::driver::coerce::ValueFormatter;
use crate::driver::pools::PoolRegistry;
use crate::driver::store::ConfigStore;
use crate::observability::metrics;

/// Result of applying one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Keys written to the live store, in apply order.
    pub updated: Vec<String>,
    /// Keys whose formatted value matched the live value.
    pub unchanged: usize,
    /// Keys that could not be written, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Writes changed keys into the live store and invalidates dependent pools.
pub struct ConfigApplyPipeline {
    store: Arc<dyn ConfigStore>,
    pools: Arc<PoolRegistry>,
    formatter: ValueFormatter,
}

impl ConfigApplyPipeline {
    pub fn new(store: Arc<dyn ConfigStore>, pools: Arc<PoolRegistry>, formatter: ValueFormatter) -> Self {
        Self {
            store,
            pools,
            formatter,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn apply(&self, chunk: &Snapshot) -> ApplyReport {
        let mut report = ApplyReport::default();

        for (key, value) in flatten(chunk) {
            let (namespace, pool) = self.pools.resolve(&key);
            let next = self.formatter.format(&namespace, value);
            let current = self.store.get(&key).unwrap_or(Value::Null);
            if current == next {
                report.unchanged += 1;
                continue;
            }

            if let Err(e) = self.store.set(&key, next) {
                tracing::error!(key = %key, error = %e, "Config update failed");
                report.failed.push((key, e.to_string()));
                continue;
            }
            if !namespace.is_empty() && self.pools.clear(&namespace, &pool) {
                metrics::record_pool_clear(&namespace);
            }
            tracing::debug!(key = %key, "Config [{}] is updated", key);
            report.updated.push(key);
        }

        metrics::record_keys_updated(report.updated.len());
        report
    }
}

impl std::fmt::Debug for ConfigApplyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigApplyPipeline")
            .field("pools", &self.pools)
            .field("formatter", &self.formatter)
            .finish()
    }
}

/// Merge every namespace's keys into one map. Namespaces are visited in chunk
/// order; a key seen again keeps its first position but takes the later value.
pub fn flatten(chunk: &Snapshot) -> ConfigurationMap {
    let mut merged = ConfigurationMap::new();
    for configurations in chunk.values() {
        for (key, value) in configurations {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
