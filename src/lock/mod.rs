//! Distributed lock primitive.
//!
//! The fetcher only needs "acquire `key` within `timeout`, release on drop".
//! How the lock is implemented across processes is up to the provider; this
//! crate ships [`LocalLock`] for single-host deployments and tests.

pub mod local;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalLock;

#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was not acquired within the allowed wait.
    #[error("lock '{key}' not acquired within {waited:?}")]
    Timeout { key: String, waited: Duration },

    /// The lock provider failed.
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Held critical section. Dropping it releases the lock.
pub struct LockGuard {
    _held: Box<dyn Send + Sync>,
}

impl LockGuard {
    pub fn new(held: impl Send + Sync + 'static) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Mutual exclusion keyed by string, shared by every worker of the client.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Block until `key` is held or `timeout` elapses.
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError>;
}
