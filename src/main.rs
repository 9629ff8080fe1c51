//! Config sync client (v1)
//!
//! Keeps a process's configuration in step with a remote config server.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────── CONFIG SYNC ────────────────────────────────┐
//!   │                                                                              │
//!   │  ┌───────────┐  tick   ┌──────────────┐  per namespace  ┌───────────────┐    │
//!   │  │ pull loop │────────▶│ coordinator  │────────────────▶│   fetcher     │────┼──▶ config
//!   │  │ (driver)  │         │  (join all)  │                 │ lock + signed │    │    server
//!   │  └─────┬─────┘         └──────────────┘                 │   long-poll   │    │
//!   │        │ changed?                                        └──────┬────────┘    │
//!   │        ▼                                                        │             │
//!   │  ┌───────────┐   ┌────────────┐   ┌─────────────┐        ┌──────▼────────┐    │
//!   │  │  chunks   │──▶│   apply    │──▶│ live store  │        │ fetch cache / │    │
//!   │  │ (≤ 200)   │   │  pipeline  │──▶│ pool clears │        │  persistence  │    │
//!   │  └───────────┘   └─────┬──────┘   └─────────────┘        └───────────────┘    │
//!   │                        ▼                                                      │
//!   │                  sibling workers                                              │
//!   └──────────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use config_sync::config::{load_config, SyncConfig};
use config_sync::driver::{ConfigStore, MemoryConfigStore};
use config_sync::lifecycle::{build, signals, Collaborators, Shutdown};
use config_sync::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "config-sync")]
#[command(about = "Keep local configuration in step with a remote config server", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single pull cycle, print the resulting snapshot and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SyncConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("config-sync v0.1.0 starting");
    tracing::info!(
        server = %config.client.server,
        namespaces = ?config.driver.namespaces,
        interval_secs = config.driver.interval_secs,
        pull_timeout_secs = config.driver.pull_timeout_secs,
        strict_mode = config.driver.strict_mode,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
    let components = build(&config, Collaborators::local(store))?;
    let mut pull_loop = components.pull_loop;

    // Boot-time sync before the first tick.
    match pull_loop.run_cycle().await {
        Ok(outcome) => tracing::info!(?outcome, "Initial configuration fetched"),
        Err(e) => tracing::error!(error = %e, "Initial configuration fetch failed"),
    }

    if cli.once {
        println!("{}", serde_json::to_string_pretty(&pull_loop.previous())?);
        return Ok(());
    }

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(pull_loop.run_supervised(shutdown.subscribe()));

    signals::wait_for_signal().await;
    tracing::info!("Shutdown requested");
    shutdown.trigger();
    handle.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
