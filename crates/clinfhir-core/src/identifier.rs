//! Namespaced identifier codec (`namespace|value`).
//!
//! Only the first `|` is structural: anything after it, including further
//! `|` characters, belongs to the value. No escaping is applied, so
//! `encode_identifier` is not the inverse of `decode_identifier` when the
//! namespace itself contains a `|`.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Separator between the namespace and the value.
pub const IDENTIFIER_SEPARATOR: char = '|';

/// Split a raw identifier on its first separator.
///
/// Empty components decode to `None`. An input without a separator is
/// treated as a bare namespace with no value.
pub fn decode_identifier(identifier: &str) -> (Option<&str>, Option<&str>) {
    let (namespace, value) = match identifier.split_once(IDENTIFIER_SEPARATOR) {
        Some((namespace, value)) => (namespace, value),
        None => (identifier, ""),
    };
    (non_empty(namespace), non_empty(value))
}

/// Decode an identifier held in a JSON value; anything but a string decodes
/// to `(None, None)`.
pub fn decode_identifier_value(identifier: &Value) -> (Option<&str>, Option<&str>) {
    match identifier {
        Value::String(s) => decode_identifier(s),
        _ => (None, None),
    }
}

/// Join a namespace and a value.
pub fn encode_identifier(namespace: &str, value: &str) -> String {
    format!("{namespace}{IDENTIFIER_SEPARATOR}{value}")
}

/// True iff the namespace equals `expected_namespace` and the value is non-empty.
pub fn is_valid_identifier(
    namespace: Option<&str>,
    value: Option<&str>,
    expected_namespace: &str,
) -> bool {
    namespace == Some(expected_namespace) && value.is_some_and(|v| !v.is_empty())
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

/// An owned, fully-populated namespaced identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacedIdentifier {
    pub namespace: String,
    pub value: String,
}

impl NamespacedIdentifier {
    pub fn new(namespace: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            value: value.into(),
        }
    }

    /// Parse `namespace|value`, requiring both parts.
    pub fn parse(raw: &str) -> Result<Self> {
        match decode_identifier(raw) {
            (Some(namespace), Some(value)) => Ok(Self::new(namespace, value)),
            _ => Err(CoreError::invalid_identifier(format!(
                "expected \"<namespace>|<value>\", got \"{raw}\""
            ))),
        }
    }

    /// Parse and require a specific namespace.
    pub fn parse_in_namespace(raw: &str, expected_namespace: &str) -> Result<Self> {
        let (namespace, value) = decode_identifier(raw);
        if !is_valid_identifier(namespace, value, expected_namespace) {
            return Err(CoreError::invalid_identifier(format!(
                "expected \"{expected_namespace}|<value>\", got \"{raw}\""
            )));
        }
        Self::parse(raw)
    }

    pub fn encode(&self) -> String {
        encode_identifier(&self.namespace, &self.value)
    }
}

impl fmt::Display for NamespacedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
