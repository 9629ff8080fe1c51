//! Host-local keyed lock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::lock::{DistributedLock, LockError, LockGuard};

/// One async mutex per key, created on first use.
#[derive(Debug, Clone, Default)]
pub struct LocalLock {
    keys: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex(&self, key: &str) -> Arc<Mutex<()>> {
        self.keys
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl DistributedLock for LocalLock {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError> {
        let mutex = self.mutex(key);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(LockGuard::new(guard)),
            Err(_) => Err(LockError::Timeout {
                key: key.to_string(),
                waited: timeout,
            }),
        }
    }
}
