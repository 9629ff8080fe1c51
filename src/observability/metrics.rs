//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_sync_fetch_total` (counter): namespace fetches by outcome
//! - `config_sync_lock_timeouts_total` (counter): lock waits that expired
//! - `config_sync_cycles_total` (counter): pull cycles, labelled by `changed`
//! - `config_sync_keys_updated_total` (counter): live store writes
//! - `config_sync_pool_clears_total` (counter): pool invalidations by namespace
//! - `config_sync_broadcast_failures_total` (counter): failed sibling sends
//! - `config_sync_loop_restarts_total` (counter): supervisor restarts

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// How a single namespace fetch resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Server returned a new token and payload.
    Updated,
    /// Server confirmed the cached token.
    Unchanged,
    /// Another worker refreshed the namespace; its persisted record was reused.
    Shared,
    /// Upstream failed; cached or durable data was served.
    Fallback,
}

impl FetchOutcome {
    fn as_str(self) -> &'static str {
        match self {
            FetchOutcome::Updated => "updated",
            FetchOutcome::Unchanged => "unchanged",
            FetchOutcome::Shared => "shared",
            FetchOutcome::Fallback => "fallback",
        }
    }
}

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_fetch(namespace: &str, outcome: FetchOutcome) {
    metrics::counter!(
        "config_sync_fetch_total",
        "namespace" => namespace.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_lock_timeout(namespace: &str) {
    metrics::counter!("config_sync_lock_timeouts_total", "namespace" => namespace.to_string())
        .increment(1);
}

pub fn record_cycle(changed: bool) {
    let label = if changed { "true" } else { "false" };
    metrics::counter!("config_sync_cycles_total", "changed" => label).increment(1);
}

pub fn record_keys_updated(count: usize) {
    metrics::counter!("config_sync_keys_updated_total").increment(count as u64);
}

pub fn record_pool_clear(namespace: &str) {
    metrics::counter!("config_sync_pool_clears_total", "namespace" => namespace.to_string())
        .increment(1);
}

pub fn record_broadcast_failure() {
    metrics::counter!("config_sync_broadcast_failures_total").increment(1);
}

pub fn record_loop_restart() {
    metrics::counter!("config_sync_loop_restarts_total").increment(1);
}
