//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config + collaborators → client, caches, driver, pull loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → waiting loop exits; an in-flight cycle completes first
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Collaborators (lock, key/value store, live store, siblings) are injected

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{build, Collaborators, Components, StartupError};
