//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sync client.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default upstream endpoint used when none is configured.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8080/api/config/http";

/// Root configuration for the sync client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Upstream config server identity and endpoint.
    pub client: ClientConfig,

    /// Pull loop and apply pipeline settings.
    pub driver: DriverConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Upstream client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the config server endpoint.
    pub server: String,

    /// Application identifier, sent as the signature prefix.
    pub app_id: String,

    /// Shared HMAC secret. Empty means requests are sent unsigned.
    pub secret: String,

    /// Cluster name reported to the server.
    pub cluster: String,

    /// Client IP reported to the server. Empty means detect.
    pub client_ip: String,

    /// Client configuration version reported to the server.
    pub version: String,

    /// Upper bound on a single HTTP round trip, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            app_id: String::new(),
            secret: String::new(),
            cluster: String::new(),
            client_ip: String::new(),
            version: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Driver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Namespaces pulled every cycle.
    pub namespaces: Vec<String>,

    /// Bounded wait for the per-namespace lock, in seconds.
    pub pull_timeout_secs: u64,

    /// Polling period in seconds. Also the lifetime of the last-good slot.
    pub interval_secs: u64,

    /// Enable literal and numeric coercion of string values.
    pub strict_mode: bool,

    /// Maximum number of keys handed to the apply pipeline at once.
    pub chunk_size: usize,

    /// Directory holding `<namespace>.toml` value templates.
    ///
    /// Only namespaces registered with a pool factory get a template; the
    /// stock binary registers none, so this is for embedders.
    pub template_dir: String,

    /// Key prefix of the TTL'd last-good slot.
    pub last_persistence_key: String,

    /// Key prefix of the non-expiring durable slot.
    pub persistence_key: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            namespaces: vec!["databases".to_string(), "redis".to_string()],
            pull_timeout_secs: 10,
            interval_secs: 60,
            strict_mode: false,
            chunk_size: 200,
            template_dir: String::new(),
            last_persistence_key: "ecconfig_persistence_configuration_last_data".to_string(),
            persistence_key: "ecconfig_persistence_configuration_data".to_string(),
        }
    }
}

impl DriverConfig {
    /// Lock wait bound as a `Duration`.
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    /// Polling period as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
