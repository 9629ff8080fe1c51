//! HMAC request signing.
//!
//! The server checks `Authorization: {appId}:{base64(HMAC-SHA1(secret, ts + "\n" + query))}`
//! together with the `Timestamp` header carrying the same millisecond value.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Builds the signature header for outbound pulls.
#[derive(Clone)]
pub struct RequestSigner {
    app_id: String,
    secret: String,
}

impl RequestSigner {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
        }
    }

    /// Whether requests will carry a signature.
    pub fn is_signing(&self) -> bool {
        !self.secret.is_empty()
    }

    /// Signature header value, or `None` when no secret is configured.
    pub fn sign(&self, timestamp: &str, canonical_query: &str) -> Option<String> {
        if !self.is_signing() {
            return None;
        }
        // HMAC accepts keys of any length; the error arm is unreachable for Hmac<Sha1>.
        let mut mac = HmacSha1::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(timestamp.as_bytes());
        mac.update(b"\n");
        mac.update(canonical_query.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Some(format!("{}:{}", self.app_id, signature))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("app_id", &self.app_id)
            .field("signing", &self.is_signing())
            .finish()
    }
}

/// Milliseconds since the epoch as a decimal string, truncated.
pub fn timestamp_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}
