//! In-memory preference store with snapshot/restore.
//!
//! Stands in for the host's persisted key-value preference storage:
//! everything a test might observe as ambient state. The controller is
//! the sole writer of store transitions; a batch starts from a known
//! baseline and either persists changes across methods (batched) or
//! rolls back to the baseline (unbatched).
//!
//! The snapshot token is an opaque in-memory value; no serialization of
//! the token itself is supported or needed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// A typed preference value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    TextSet(BTreeSet<String>),
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PrefValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Opaque capture of the store's full key/value state.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefSnapshot {
    values: BTreeMap<String, PrefValue>,
}

/// Thread-safe in-memory preference store.
///
/// Owned by the run context, never a process-wide static, so parallel
/// shards each get their own ambient state.
#[derive(Debug, Default)]
pub struct PrefStore {
    values: Mutex<BTreeMap<String, PrefValue>>,
}

impl PrefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key to a value, replacing any previous value of any type.
    pub fn set(&self, key: impl Into<String>, value: impl Into<PrefValue>) {
        self.lock().insert(key.into(), value.into());
    }

    /// Read a key's value, if present.
    pub fn get(&self, key: &str) -> Option<PrefValue> {
        self.lock().get(key).cloned()
    }

    /// Read a boolean, or `default` when absent or of another type.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(PrefValue::Bool(value)) => value,
            _ => default,
        }
    }

    /// Read an integer, or `default` when absent or of another type.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(PrefValue::Int(value)) => value,
            _ => default,
        }
    }

    /// Read a string, or `default` when absent or of another type.
    pub fn get_text(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(PrefValue::Text(value)) => value,
            _ => default.to_string(),
        }
    }

    /// Remove a key. Returns the removed value, if any.
    pub fn remove(&self, key: &str) -> Option<PrefValue> {
        self.lock().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clear all keys.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Capture the current key/value state as an opaque token.
    pub fn snapshot(&self) -> PrefSnapshot {
        PrefSnapshot {
            values: self.lock().clone(),
        }
    }

    /// Replace the full current state with the token's captured state.
    /// No partial restores: keys added since the snapshot are dropped,
    /// removed keys reappear, changed values revert.
    pub fn restore(&self, snapshot: &PrefSnapshot) {
        *self.lock() = snapshot.values.clone();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, PrefValue>> {
        self.values.lock().expect("pref store lock poisoned")
    }
}
