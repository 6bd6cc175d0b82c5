//! Sensitive value masking for captured request data.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Nesting depth past which whole sub-trees are masked instead of walked.
const MAX_DEPTH: usize = 32;

/// Masks values stored under sensitive keys, case-insensitively.
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: HashSet<String>,
    mask: String,
}

impl Redactor {
    pub fn new<I, S>(keys: I, mask: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys.into_iter().map(|k| k.as_ref().to_lowercase()).collect(),
            mask: mask.into(),
        }
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.contains(&key.to_lowercase())
    }

    /// Return a masked copy of `value`. Scalars pass through unchanged.
    pub fn redact(&self, value: &Value) -> Value {
        self.redact_at(value, 0)
    }

    /// Mask the entries of a flat or nested object.
    pub fn redact_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        self.redact_object(map, 0)
    }

    fn redact_at(&self, value: &Value, depth: usize) -> Value {
        if depth > MAX_DEPTH && is_container(value) {
            return Value::String(self.mask.clone());
        }
        match value {
            Value::Object(map) => Value::Object(self.redact_object(map, depth)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.redact_at(item, depth + 1))
                    .collect(),
            ),
            scalar => scalar.clone(),
        }
    }

    fn redact_object(&self, map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let masked = if self.is_sensitive(key) {
                    Value::String(self.mask.clone())
                } else {
                    self.redact_at(value, depth + 1)
                };
                (key.clone(), masked)
            })
            .collect()
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Convenience form of [`Redactor::redact`].
pub fn redact<S: AsRef<str>>(value: &Value, sensitive_keys: &[S], mask_text: &str) -> Value {
    Redactor::new(sensitive_keys, mask_text).redact(value)
}
