//! Config server client.
//!
//! # Data Flow
//! ```text
//! coordinator.rs  one task per namespace, joined
//!     → fetcher.rs   lock, single-flight check, signed long-poll
//!         → signer.rs    HMAC-SHA1 Authorization header
//!         → options.rs   cache key, query, base URL
//!         → transport.rs injected HTTP client
//!     → Snapshot (namespace → configuration)
//! ```

pub mod coordinator;
pub mod fetcher;
pub mod options;
pub mod signer;
pub mod transport;
pub mod types;

pub use coordinator::PullCoordinator;
pub use fetcher::{FetchError, NamespaceFetcher};
pub use options::ClientOptions;
pub use signer::RequestSigner;
pub use transport::{ConfigTransport, ReqwestTransport, TransportError, TransportFactory, TransportResponse};
pub use types::{ConfigurationMap, PullResponse, Snapshot};
