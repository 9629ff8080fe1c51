//! Client identity: endpoint, cluster, version and the keys derived from them.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::config::ClientConfig;

/// Identity the client presents to the config server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub server: String,
    pub app_id: String,
    pub cluster: String,
    pub client_ip: String,
    pub version: String,
}

impl ClientOptions {
    /// Build options from config, detecting the client IP when unset.
    pub fn from_config(config: &ClientConfig) -> Self {
        let client_ip = if config.client_ip.is_empty() {
            local_ip().to_string()
        } else {
            config.client_ip.clone()
        };
        Self {
            server: config.server.clone(),
            app_id: config.app_id.clone(),
            cluster: config.cluster.clone(),
            client_ip,
            version: config.version.clone(),
        }
    }

    /// Endpoint every namespace pull is sent to.
    pub fn base_url(&self) -> &str {
        &self.server
    }

    /// Process-independent cache key for a namespace.
    ///
    /// Every worker with the same identity derives the same key, which is what
    /// lets the persistence slots and the lock be shared between them.
    pub fn build_cache_key(&self, namespace: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.app_id, self.cluster, self.version, namespace
        )
    }

    /// Query parameters in the order the server signs them.
    pub fn query(&self, namespace: &str, refresh_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("ip", self.client_ip.clone()),
            ("cluster", self.cluster.clone()),
            ("namespace", namespace.to_string()),
            ("version", self.version.clone()),
            ("refreshKey", refresh_key.to_string()),
        ]
    }
}

/// Form-encode query pairs (`application/x-www-form-urlencoded`, spaces as `+`).
pub fn canonical_query(pairs: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// Best-effort address of the outbound interface.
///
/// Connecting a UDP socket sends nothing; it only asks the OS for a route.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ClientOptions {
        ClientOptions {
            server: "http://config.local/api/config/http".into(),
            app_id: "shop".into(),
            cluster: "prod".into(),
            client_ip: "10.0.0.7".into(),
            version: "1.2".into(),
        }
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let opts = options();
        assert_eq!(opts.build_cache_key("redis"), "shop:prod:1.2:redis");
        assert_eq!(opts.build_cache_key("redis"), opts.clone().build_cache_key("redis"));
        assert_ne!(opts.build_cache_key("redis"), opts.build_cache_key("databases"));
    }

    #[test]
    fn test_canonical_query_order_and_encoding() {
        let opts = options();
        let query = canonical_query(&opts.query("databases", "a b&c"));
        assert_eq!(
            query,
            "ip=10.0.0.7&cluster=prod&namespace=databases&version=1.2&refreshKey=a+b%26c"
        );
    }

    #[test]
    fn test_explicit_client_ip_wins() {
        let config = ClientConfig {
            client_ip: "192.168.1.9".into(),
            ..ClientConfig::default()
        };
        assert_eq!(ClientOptions::from_config(&config).client_ip, "192.168.1.9");
    }
}
