//! Unit key/value store
//!
//! The charm keeps everything it learns from relations in a small persisted
//! key/value store. Values are JSON so the on-disk format stays compatible
//! with the charmhelpers `unitdata` database used by earlier charm revisions.

pub mod keys;
pub mod memory;
pub mod sqlite;

use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a store backend
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A persisted mapping of string keys to JSON values
pub trait ConfigStore {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Create or overwrite a value
    fn set(&mut self, key: &str, value: Value) -> StoreResult<()>;

    /// Remove a value; removing an absent key is a no-op
    fn unset(&mut self, key: &str) -> StoreResult<()>;
}

/// Whether a stored value counts as present.
///
/// Null, empty strings and `false` are treated the same as a missing key.
pub fn value_is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Convenience accessors available on every store
pub trait ConfigStoreExt: ConfigStore {
    /// Read a value rendered as a string (numbers and booleans are stringified)
    fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(match self.get(key)? {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }

    /// Whether the key is present and non-empty
    fn is_set(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.as_ref().is_some_and(value_is_set))
    }

    /// Whether every key in the group is present and non-empty
    fn all_set(&self, keys: &[&str]) -> StoreResult<bool> {
        for key in keys {
            if !self.is_set(key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn set_str(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.set(key, Value::String(value.to_string()))
    }

    fn set_bool(&mut self, key: &str, value: bool) -> StoreResult<()> {
        self.set(key, Value::Bool(value))
    }

    fn unset_all(&mut self, keys: &[&str]) -> StoreResult<()> {
        for key in keys {
            self.unset(key)?;
        }
        Ok(())
    }
}

impl<T: ConfigStore + ?Sized> ConfigStoreExt for T {}
