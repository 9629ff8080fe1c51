//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Pull loop body fails:
//!     → supervisor logs the error
//!     → backoff.rs (restart delay, capped by the polling interval)
//!     → loop body restarts with the previous snapshot intact
//! ```
//!
//! # Design Decisions
//! - Upstream failures never reach the supervisor; they degrade to cached data
//! - The supervisor never gives up while the process is alive
//! - Jittered delay keeps sibling workers from restarting in lockstep

pub mod backoff;
