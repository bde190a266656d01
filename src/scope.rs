//! Execution scope - the mutable context threaded through one chain run
//!
//! Seeded from the trigger payload, extended by every async action's
//! resolved value, visible to every subsequent step, and dropped when the
//! chain finishes.
//!
//! Uses FxHashMap for faster hashing on small string keys.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::AppError;

/// Resolved key → value mappings for one chain execution
#[derive(Debug, Clone, Default)]
pub struct Scope {
    values: FxHashMap<String, Value>,
}

impl Scope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope seeded from a trigger payload.
    ///
    /// Only object payloads contribute keys; `Null` (payload-less signals)
    /// seeds an empty scope.
    pub fn seed(payload: Value) -> Self {
        let mut scope = Self::new();
        scope.merge(payload);
        scope
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a key, treating absence as JSON null. Used by `when` branch
    /// conditions, where a missing key simply selects the else branch.
    pub fn get_or_null(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Merge an action's resolved value into the scope. Objects contribute
    /// their keys directly; any other non-null value lands under `"result"`.
    pub fn merge(&mut self, value: Value) {
        match value {
            Value::Object(map) => {
                for (key, entry) in map {
                    self.values.insert(key, entry);
                }
            }
            Value::Null => {}
            other => {
                self.values.insert("result".to_string(), other);
            }
        }
    }

    /// Record a failed action's error for the `error` sub-chain to store.
    pub fn set_error(&mut self, error: &AppError) {
        let value = serde_json::to_value(error).unwrap_or(Value::Null);
        self.values.insert("error".to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
