//! Shared configuration payload types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One namespace's configuration: dotted key → value.
///
/// Backed by an insertion-ordered JSON object so key order from the server
/// survives into the apply pipeline.
pub type ConfigurationMap = serde_json::Map<String, serde_json::Value>;

/// Merged result of one pull cycle: namespace → configuration.
pub type Snapshot = BTreeMap<String, ConfigurationMap>;

/// Body of a successful upstream response.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Server-issued change token.
    #[serde(default, deserialize_with = "token_from_any")]
    pub refresh_key: String,

    /// Namespace payload. Missing or non-object bodies decode as empty.
    #[serde(default, deserialize_with = "map_or_empty")]
    pub configurations: ConfigurationMap,
}

fn token_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn map_or_empty<'de, D>(deserializer: D) -> Result<ConfigurationMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde_json::Value;
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => ConfigurationMap::new(),
    })
}
