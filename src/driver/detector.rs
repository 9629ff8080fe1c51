//! Timed pull loop and its supervisor.
//!
//! # States
//! ```text
//! WAITING → PULLING: interval elapsed
//! PULLING → WAITING: cycle finished, whatever the outcome
//! WAITING → stopped: shutdown observed (an in-flight cycle always completes first)
//! ```
//!
//! A failed or panicking cycle leaves the previous snapshot in place, ends
//! the loop body and hands control to the supervisor, which restarts it after
//! a capped, jittered delay.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;

use crate::client::coordinator::PullCoordinator;
use crate::client::types::{ConfigurationMap, Snapshot};
use crate::driver::{Driver, SyncError};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::backoff::{restart_cap, restart_delay};

/// First restart delay; doubles up to `min(interval, 60s)`.
const RESTART_BASE: Duration = Duration::from_secs(1);

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Merged result equals the previous snapshot; nothing applied.
    Unchanged,
    /// Snapshot changed and every chunk was dispatched.
    Applied { chunks: usize, updated: usize },
}

/// Pulls on a timer and applies whatever changed.
pub struct PullLoop {
    coordinator: PullCoordinator,
    driver: Arc<Driver>,
    namespaces: Vec<String>,
    chunk_size: usize,
    interval: Duration,
    previous: Option<Snapshot>,
    failures: u32,
}

impl PullLoop {
    pub fn new(
        coordinator: PullCoordinator,
        driver: Arc<Driver>,
        namespaces: Vec<String>,
        chunk_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            driver,
            namespaces,
            chunk_size: chunk_size.max(1),
            interval,
            previous: None,
            failures: 0,
        }
    }

    /// Snapshot accepted by the last successful cycle.
    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    /// One PULLING pass.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, SyncError> {
        let snapshot = self.coordinator.pull_all(&self.namespaces).await;
        if self.previous.as_ref() == Some(&snapshot) {
            metrics::record_cycle(false);
            return Ok(CycleOutcome::Unchanged);
        }
        metrics::record_cycle(true);

        let mut chunks = 0;
        let mut updated = 0;
        let mut first_error = None;
        for chunk in split_chunks(&snapshot, self.chunk_size) {
            chunks += 1;
            match self.driver.sync_config(chunk).await {
                Ok(report) => updated += report.updated.len(),
                Err(e) => {
                    tracing::error!(error = %e, "Chunk apply failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        tracing::info!(chunks, updated, "Configuration snapshot applied");
        self.previous = Some(snapshot);
        Ok(CycleOutcome::Applied { chunks, updated })
    }

    /// WAITING/PULLING until shutdown (`Ok`) or a failed cycle (`Err`).
    pub async fn run(&mut self, shutdown: &mut ShutdownSignal) -> Result<(), SyncError> {
        loop {
            if shutdown.is_triggered() {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => return Ok(()),
            }

            match self.run_cycle().await {
                Ok(outcome) => {
                    self.failures = 0;
                    tracing::debug!(?outcome, "Pull cycle finished");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Pull cycle failed");
                    return Err(e);
                }
            }
        }
    }

    /// Run the loop until shutdown, restarting it after every failure or panic.
    pub async fn run_supervised(mut self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            namespaces = ?self.namespaces,
            interval_secs = self.interval.as_secs(),
            "Config pull loop starting"
        );
        let cap = restart_cap(self.interval);

        loop {
            let attempt = AssertUnwindSafe(self.run(&mut shutdown)).catch_unwind().await;
            match attempt {
                Ok(Ok(())) => break,
                Ok(Err(_)) => {}
                Err(panic) => {
                    tracing::error!(reason = panic_reason(panic.as_ref()), "Pull loop panicked");
                }
            }

            self.failures = self.failures.saturating_add(1);
            metrics::record_loop_restart();
            let delay = restart_delay(self.failures, RESTART_BASE.min(cap), cap);
            tracing::warn!(attempt = self.failures, delay_ms = delay.as_millis() as u64, "Restarting pull loop");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Config pull loop stopped");
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown"
    }
}

impl std::fmt::Debug for PullLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullLoop")
            .field("namespaces", &self.namespaces)
            .field("chunk_size", &self.chunk_size)
            .field("interval", &self.interval)
            .finish()
    }
}

/// One chunk per `size` keys of each namespace, namespace order preserved.
pub fn split_chunks(snapshot: &Snapshot, size: usize) -> Vec<Snapshot> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    for (namespace, configurations) in snapshot {
        if configurations.len() <= size {
            chunks.push(Snapshot::from([(namespace.clone(), configurations.clone())]));
            continue;
        }
        let mut current = ConfigurationMap::new();
        for (key, value) in configurations {
            current.insert(key.clone(), value.clone());
            if current.len() == size {
                chunks.push(Snapshot::from([(namespace.clone(), std::mem::take(&mut current))]));
            }
        }
        if !current.is_empty() {
            chunks.push(Snapshot::from([(namespace.clone(), current)]));
        }
    }
    chunks
}
