//! Parsed template documents and lenient field accessors.
//!
//! Templates are read as untyped YAML trees. Field lookups never fail: a key
//! that is present with the wrong kind of value reads exactly like a missing
//! key and yields the caller's default.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tempdocs_shared::{Result, TempDocsError};

/// File extensions recognized as template documents.
pub const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Whether a path carries a template file extension.
pub fn is_template_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
}

// ---------------------------------------------------------------------------
// TemplateDocument
// ---------------------------------------------------------------------------

/// The raw parsed form of a template file. The root is always a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDocument {
    root: Value,
}

impl TemplateDocument {
    /// Parse YAML text. An empty document parses to an empty mapping.
    ///
    /// Merge keys (`<<: *anchor`) are expanded before the tree is handed on.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self {
                root: Value::Object(Map::new()),
            });
        }

        // Only the first document of a multi-document stream is read.
        let Some(first) = serde_yaml::Deserializer::from_str(content).next() else {
            return Self::from_value(Value::Null);
        };

        let mut yaml = serde_yaml::Value::deserialize(first)
            .map_err(|e| TempDocsError::parse(format!("error parsing YAML: {e}")))?;
        yaml.apply_merge()
            .map_err(|e| TempDocsError::parse(format!("error expanding YAML merge keys: {e}")))?;

        let value = serde_json::to_value(&yaml)
            .map_err(|e| TempDocsError::parse(format!("unsupported YAML structure: {e}")))?;
        Self::from_value(value)
    }

    /// Wrap an already-parsed value. `null` becomes an empty mapping; any
    /// other non-mapping root is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) => Ok(Self { root: value }),
            Value::Null => Ok(Self {
                root: Value::Object(Map::new()),
            }),
            other => Err(TempDocsError::parse(format!(
                "document root must be a mapping, found {}",
                kind_of(&other)
            ))),
        }
    }

    /// Top-level entry by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// The whole document as a JSON value, for schema evaluation.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// String value at `key`, or `default` when absent or not a string.
pub fn string_or(map: &Map<String, Value>, key: &str, default: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Boolean value at `key`, or `default` when absent or not a boolean.
pub fn bool_or(map: &Map<String, Value>, key: &str, default: bool) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Nested mapping at `key`, if the value is one.
pub fn mapping<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

/// String items of the sequence at `key`, in order.
///
/// Non-string items are dropped. Anything other than a sequence (including
/// an empty mapping, a common way of writing "none") yields an empty list.
pub fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Short human name for a value's kind, used in diagnostics.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
