//! Session-scoped key-value store

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Key not found in session state: {0}")]
    KeyNotFound(String),
    #[error("Value under `{key}` has an unexpected type: {source}")]
    TypeMismatch {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize value for `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-value state that survives reruns of one session.
///
/// Writes always overwrite. There is no internal locking; the owning
/// session serializes access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateStore {
    entries: HashMap<String, Value>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Result<&Value, StateError> {
        self.entries
            .get(key)
            .ok_or_else(|| StateError::KeyNotFound(key.to_string()))
    }

    /// Get the value under `key`, or `default` when absent. Never inserts.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.entries.get(key).cloned().unwrap_or(default)
    }

    /// Store `value` under `key`, replacing whatever was there
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove `key`. Absent keys are a no-op.
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Return the value under `key`, inserting `init()` first if absent
    pub fn get_or_insert_with<F>(&mut self, key: impl Into<String>, init: F) -> &mut Value
    where
        F: FnOnce() -> Value,
    {
        self.entries.entry(key.into()).or_insert_with(init)
    }

    /// Replace the value under an existing `key` with `f(old)`
    pub fn update<F>(&mut self, key: &str, f: F) -> Result<&Value, StateError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let slot = self
            .entries
            .get_mut(key)
            .ok_or_else(|| StateError::KeyNotFound(key.to_string()))?;
        let next = f(slot);
        *slot = next;
        Ok(slot)
    }

    /// Deserialize the value under `key` into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        let value = self.get(key)?;
        T::deserialize(value).map_err(|source| StateError::TypeMismatch {
            key: key.to_string(),
            source,
        })
    }

    /// Serialize `value` and store it under `key`
    pub fn set_as<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StateError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| StateError::Serialize {
            key: key.clone(),
            source,
        })?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys currently stored, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
