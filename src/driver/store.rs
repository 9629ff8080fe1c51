//! Live configuration store.
//!
//! The process reads its configuration through dotted keys
//! (`databases.default.host`). The apply pipeline is the only writer.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("cannot set '{key}': {reason}")]
pub struct ConfigStoreError {
    pub key: String,
    pub reason: String,
}

/// Dotted-key view of the live configuration.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigStoreError>;

    /// Whether `key` is present, even when its value is null.
    fn has(&self, key: &str) -> bool;
}

/// In-memory store: an immutable JSON tree swapped atomically on write.
///
/// Readers never block and always see a whole tree.
#[derive(Debug)]
pub struct MemoryConfigStore {
    root: ArcSwap<Value>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Seed from an existing tree. Non-object roots start empty.
    pub fn from_value(value: Value) -> Self {
        let root = match value {
            Value::Object(_) => value,
            _ => Value::Object(Map::new()),
        };
        Self {
            root: ArcSwap::from_pointee(root),
        }
    }

    /// Current tree.
    pub fn snapshot(&self) -> Arc<Value> {
        self.root.load_full()
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

fn insert(root: &mut Value, key: &str, value: Value) {
    let mut segments = key.split('.').peekable();
    let mut node = root;
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.root.load(), key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigStoreError> {
        if key.is_empty() || key.split('.').any(str::is_empty) {
            return Err(ConfigStoreError {
                key: key.to_string(),
                reason: "empty path segment".to_string(),
            });
        }
        self.root.rcu(|current| {
            let mut next = Value::clone(current);
            insert(&mut next, key, value.clone());
            next
        });
        Ok(())
    }

    fn has(&self, key: &str) -> bool {
        lookup(&self.root.load(), key).is_some()
    }
}
