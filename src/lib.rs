//! Distributed configuration synchronization client.

pub mod cache;
pub mod client;
pub mod config;
pub mod driver;
pub mod lifecycle;
pub mod lock;
pub mod observability;
pub mod resilience;

pub use client::{PullCoordinator, Snapshot};
pub use config::SyncConfig;
pub use driver::{Driver, PullLoop};
pub use lifecycle::Shutdown;
