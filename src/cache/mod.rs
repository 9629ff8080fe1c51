//! Local and shared caches of namespace payloads.
//!
//! # Data Flow
//! ```text
//! fetch.rs        process-local (token, payload) per cache key
//!                 → previous token for the next pull, fallback on failure
//! persistence.rs  shared key/value store, two slots per cache key
//!                 → last-good (TTL = polling interval): single-flight reuse
//!                 → durable (no TTL): survives a full upstream outage
//! ```
//!
//! # Design Decisions
//! - The fetch cache is owned by the coordinator and handed to fetch tasks,
//!   never ambient global state
//! - Both persistence slots are written together, last-good first

pub mod fetch;
pub mod persistence;

pub use fetch::{CacheEntry, FetchCache};
pub use persistence::{KvStore, MemoryKvStore, PersistenceRecord, PersistenceStore, StoreError};
