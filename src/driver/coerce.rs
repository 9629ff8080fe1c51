//! Value formatting before values reach the live store.
//!
//! - Mapping values are laid over the namespace template (incoming sub-keys win).
//! - In strict mode, scalar strings are coerced: numeric strings to numbers and
//!   the literals `true`, `false`, `empty`, `null` (optionally parenthesised,
//!   any case) to their typed values.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::{Number, Value};
use thiserror::Error;

use crate::client::types::ConfigurationMap;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("template {path} is not valid TOML: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("template {path} cannot be represented as JSON: {source}")]
    Convert {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Load `<dir>/<namespace>.toml` for each namespace. A missing file yields
/// an empty template.
pub fn load_templates<S: AsRef<str>>(
    dir: &Path,
    namespaces: &[S],
) -> Result<HashMap<String, ConfigurationMap>, TemplateError> {
    let mut templates = HashMap::new();
    for namespace in namespaces {
        let namespace = namespace.as_ref();
        let path = dir.join(format!("{namespace}.toml"));
        let display = path.display().to_string();
        let template = match fs::read_to_string(&path) {
            Ok(raw) => {
                let table: toml::Table = toml::from_str(&raw).map_err(|source| TemplateError::Parse {
                    path: display.clone(),
                    source,
                })?;
                match serde_json::to_value(table) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => ConfigurationMap::new(),
                    Err(source) => return Err(TemplateError::Convert { path: display, source }),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigurationMap::new(),
            Err(source) => return Err(TemplateError::Io { path: display, source }),
        };
        tracing::debug!(namespace, keys = template.len(), "Loaded value template");
        templates.insert(namespace.to_string(), template);
    }
    Ok(templates)
}

/// Applies templates and strict-mode coercion.
#[derive(Debug, Clone, Default)]
pub struct ValueFormatter {
    strict: bool,
    templates: HashMap<String, ConfigurationMap>,
}

impl ValueFormatter {
    pub fn new(strict: bool, templates: HashMap<String, ConfigurationMap>) -> Self {
        Self { strict, templates }
    }

    pub fn format(&self, namespace: &str, value: Value) -> Value {
        let value = match value {
            Value::Object(raw) => match self.templates.get(namespace) {
                Some(template) => {
                    let mut merged = template.clone();
                    for (key, sub) in raw {
                        merged.insert(key, sub);
                    }
                    Value::Object(merged)
                }
                None => Value::Object(raw),
            },
            other => other,
        };

        match value {
            Value::String(s) if self.strict => coerce_str(s),
            other => other,
        }
    }
}

fn coerce_str(s: String) -> Value {
    if let Some(number) = parse_numeric(&s) {
        return number;
    }
    match s.to_ascii_lowercase().as_str() {
        "true" | "(true)" => Value::Bool(true),
        "false" | "(false)" => Value::Bool(false),
        "empty" | "(empty)" => Value::String(String::new()),
        "null" | "(null)" => Value::Null,
        _ => Value::String(s),
    }
}

/// Decimal literal: optional sign, digits with an optional fraction, optional
/// exponent. Surrounding whitespace is allowed.
fn is_numeric(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        digits += i - frac_start;
    }
    if digits == 0 {
        return false;
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

fn parse_numeric(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if !is_numeric(trimmed) {
        return None;
    }
    if !trimmed.contains('.') {
        if let Ok(int) = trimmed.parse::<i64>() {
            return Some(Value::Number(int.into()));
        }
        let float: f64 = trimmed.parse().ok()?;
        if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
            return Some(Value::Number((float as i64).into()));
        }
        return Number::from_f64(float).map(Value::Number);
    }
    let float: f64 = trimmed.parse().ok()?;
    Number::from_f64(float).map(Value::Number)
}
