//! Rebroadcast of accepted changes to sibling workers.
//!
//! Only one worker per host runs the pull loop; the others learn about
//! changes through [`PipeMessage`]s and apply them locally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::client::types::Snapshot;
use crate::observability::metrics;

/// Bound on a single send; a stuck sibling must not stall the others.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("cannot encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cannot decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("worker {worker} unreachable: {reason}")]
    Send { worker: u32, reason: String },
}

/// One accepted chunk, as sent between workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeMessage {
    pub id: Uuid,
    pub origin: u32,
    pub chunk: Snapshot,
}

impl PipeMessage {
    pub fn new(origin: u32, chunk: Snapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            chunk,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, BroadcastError> {
        serde_json::to_vec(self).map_err(BroadcastError::Encode)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, BroadcastError> {
        serde_json::from_slice(payload).map_err(BroadcastError::Decode)
    }
}

/// Send side of the pipe to one sibling worker.
#[async_trait]
pub trait SiblingChannel: Send + Sync {
    fn worker_id(&self) -> u32;

    async fn send(&self, payload: &[u8]) -> Result<(), BroadcastError>;
}

/// In-process sibling reached through an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSibling {
    worker_id: u32,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelSibling {
    pub fn new(worker_id: u32) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { worker_id, tx }, rx)
    }
}

#[async_trait]
impl SiblingChannel for ChannelSibling {
    fn worker_id(&self) -> u32 {
        self.worker_id
    }

    async fn send(&self, payload: &[u8]) -> Result<(), BroadcastError> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| BroadcastError::Send {
                worker: self.worker_id,
                reason: "receiver closed".to_string(),
            })
    }
}

/// Delivery summary for one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans messages out to every sibling except the sending worker.
pub struct ProcessBroadcaster {
    worker_id: u32,
    siblings: Vec<Arc<dyn SiblingChannel>>,
}

impl ProcessBroadcaster {
    pub fn new(worker_id: u32, siblings: Vec<Arc<dyn SiblingChannel>>) -> Self {
        Self { worker_id, siblings }
    }

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    /// Send `message` to all siblings concurrently.
    ///
    /// Per-recipient failures are logged and counted, never returned; only an
    /// unencodable message is an error.
    pub async fn broadcast(&self, message: &PipeMessage) -> Result<BroadcastReport, BroadcastError> {
        let recipients: Vec<_> = self
            .siblings
            .iter()
            .filter(|sibling| sibling.worker_id() != self.worker_id)
            .collect();
        if recipients.is_empty() {
            return Ok(BroadcastReport::default());
        }

        let payload = message.encode()?;
        let sends = recipients.iter().map(|sibling| {
            let payload = &payload;
            async move {
                let worker = sibling.worker_id();
                match tokio::time::timeout(SEND_TIMEOUT, sibling.send(payload)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::error!(worker, error = %e, "Configuration synchronization failed. Please restart the server.");
                        false
                    }
                    Err(_) => {
                        tracing::error!(worker, "Configuration synchronization timed out. Please restart the server.");
                        false
                    }
                }
            }
        });

        let mut report = BroadcastReport::default();
        for delivered in join_all(sends).await {
            if delivered {
                report.delivered += 1;
            } else {
                report.failed += 1;
                metrics::record_broadcast_failure();
            }
        }
        Ok(report)
    }
}

impl std::fmt::Debug for ProcessBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessBroadcaster")
            .field("worker_id", &self.worker_id)
            .field("siblings", &self.siblings.len())
            .finish()
    }
}
