//! Change detection and application.
//!
//! # Data Flow
//! ```text
//! detector.rs   timed loop → PullCoordinator → compare with previous snapshot
//!     → chunks of at most `chunk_size` keys per namespace
//!     → Driver::sync_config(chunk)
//!         → apply.rs      live store writes + pool invalidation
//!         → broadcast.rs  PipeMessage to sibling workers
//!
//! sibling worker: Driver::on_pipe_message(bytes) → apply.rs
//! ```

pub mod apply;
pub mod broadcast;
pub mod coerce;
pub mod detector;
pub mod pools;
pub mod store;

use thiserror::Error;

use crate::client::types::Snapshot;

pub use apply::{ApplyReport, ConfigApplyPipeline};
pub use broadcast::{BroadcastError, ChannelSibling, PipeMessage, ProcessBroadcaster, SiblingChannel};
pub use coerce::{load_templates, TemplateError, ValueFormatter};
pub use detector::{CycleOutcome, PullLoop};
pub use pools::{Pool, PoolError, PoolFactory, PoolInvalidator, PoolRegistry};
pub use store::{ConfigStore, ConfigStoreError, MemoryConfigStore};

/// Failures of one loop body; handled by the supervisor.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{} key(s) could not be applied, first: {}", .failed.len(), first_failure(.failed))]
    Apply { failed: Vec<(String, String)> },

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

fn first_failure(failed: &[(String, String)]) -> String {
    failed
        .first()
        .map(|(key, reason)| format!("{key} ({reason})"))
        .unwrap_or_default()
}

/// Applies chunks locally and keeps sibling workers in step.
#[derive(Debug)]
pub struct Driver {
    pipeline: ConfigApplyPipeline,
    broadcaster: ProcessBroadcaster,
}

impl Driver {
    pub fn new(pipeline: ConfigApplyPipeline, broadcaster: ProcessBroadcaster) -> Self {
        Self {
            pipeline,
            broadcaster,
        }
    }

    pub fn pipeline(&self) -> &ConfigApplyPipeline {
        &self.pipeline
    }

    /// Apply `chunk` here, then forward it to the siblings.
    ///
    /// The chunk is forwarded even when some keys failed locally; the failure
    /// is returned afterwards so the cycle is retried.
    pub async fn sync_config(&self, chunk: Snapshot) -> Result<ApplyReport, SyncError> {
        let report = self.pipeline.apply(&chunk);

        let message = PipeMessage::new(self.broadcaster.worker_id(), chunk);
        let delivery = self.broadcaster.broadcast(&message).await?;
        if delivery.failed > 0 {
            tracing::warn!(message_id = %message.id, failed = delivery.failed, "Some workers missed a configuration change");
        }

        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(SyncError::Apply {
                failed: report.failed,
            })
        }
    }

    /// Apply a chunk received from another worker. Never re-broadcast.
    pub fn on_pipe_message(&self, payload: &[u8]) -> Result<ApplyReport, SyncError> {
        let message = PipeMessage::decode(payload)?;
        tracing::debug!(message_id = %message.id, origin = message.origin, "Applying configuration from sibling worker");
        let report = self.pipeline.apply(&message.chunk);
        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(SyncError::Apply {
                failed: report.failed,
            })
        }
    }
}
