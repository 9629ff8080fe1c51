//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, chunk size > 0)
//! - Detect duplicate namespaces and clashing persistence prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SyncConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::SyncConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("client.server '{0}' is not an absolute http(s) URL")]
    InvalidServer(String),

    #[error("driver.namespaces must not be empty")]
    NoNamespaces,

    #[error("driver.namespaces contains an empty name")]
    EmptyNamespace,

    #[error("driver.namespaces lists '{0}' more than once")]
    DuplicateNamespace(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{0} must not be empty")]
    EmptyPrefix(&'static str),

    #[error("driver.persistence_key and driver.last_persistence_key must differ")]
    SamePrefix,

    #[error("client.secret is set but client.app_id is empty")]
    SecretWithoutAppId,
}

/// Check a parsed configuration, collecting every problem.
pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match url::Url::parse(&config.client.server) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => errors.push(ValidationError::InvalidServer(config.client.server.clone())),
    }

    if !config.client.secret.is_empty() && config.client.app_id.is_empty() {
        errors.push(ValidationError::SecretWithoutAppId);
    }

    let driver = &config.driver;
    if driver.namespaces.is_empty() {
        errors.push(ValidationError::NoNamespaces);
    }
    let mut seen = HashSet::new();
    for namespace in &driver.namespaces {
        if namespace.is_empty() {
            errors.push(ValidationError::EmptyNamespace);
        } else if !seen.insert(namespace.as_str()) {
            errors.push(ValidationError::DuplicateNamespace(namespace.clone()));
        }
    }

    let positive = [
        ("client.request_timeout_secs", config.client.request_timeout_secs),
        ("driver.pull_timeout_secs", driver.pull_timeout_secs),
        ("driver.interval_secs", driver.interval_secs),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }
    if driver.chunk_size == 0 {
        errors.push(ValidationError::Zero("driver.chunk_size"));
    }

    if driver.persistence_key.is_empty() {
        errors.push(ValidationError::EmptyPrefix("driver.persistence_key"));
    }
    if driver.last_persistence_key.is_empty() {
        errors.push(ValidationError::EmptyPrefix("driver.last_persistence_key"));
    }
    if !driver.persistence_key.is_empty() && driver.persistence_key == driver.last_persistence_key {
        errors.push(ValidationError::SamePrefix);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
