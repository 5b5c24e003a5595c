//! Key-value persistence used for pause state, locale memory and timing

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Minimal key-value contract. Implementations must be cheap to call from
/// inside the speech service lock.
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn set_string(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn get_double(&self, key: &str) -> Option<f64>;

    fn set_double(&self, key: &str, value: f64) -> Result<()>;

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_string(key).and_then(|v| v.parse().ok())
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" })
    }

    fn contains(&self, key: &str) -> bool {
        self.get_string(key).is_some() || self.get_double(key).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Double(f64),
    Text(String),
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.read().get(key) {
            Some(StoredValue::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), StoredValue::Text(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }

    fn get_double(&self, key: &str) -> Option<f64> {
        match self.values.read().get(key) {
            Some(StoredValue::Double(value)) => Some(*value),
            _ => None,
        }
    }

    fn set_double(&self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::Store(format!("refusing to store non-finite value for {}", key)));
        }
        self.values
            .write()
            .insert(key.to_string(), StoredValue::Double(value));
        Ok(())
    }
}

/// Store backed by a JSON file, rewritten on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, StoredValue>>,
}

impl JsonFileStore {
    /// Open the file, starting empty when it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            HashMap::new()
        };
        debug!("Opened key-value store {:?} with {} entries", path, values.len());
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_out(&self, values: &HashMap<String, StoredValue>) -> Result<()> {
        let data = serde_json::to_string_pretty(values)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    fn update(&self, key: &str, value: Option<StoredValue>) -> Result<()> {
        let mut values = self.values.write();
        match value {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => {
                if values.remove(key).is_none() {
                    return Ok(());
                }
            }
        }
        self.write_out(&values)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.read().get(key) {
            Some(StoredValue::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.update(key, Some(StoredValue::Text(value.to_string())))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(key, None)
    }

    fn get_double(&self, key: &str) -> Option<f64> {
        match self.values.read().get(key) {
            Some(StoredValue::Double(value)) => Some(*value),
            _ => None,
        }
    }

    fn set_double(&self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::Store(format!("refusing to store non-finite value for {}", key)));
        }
        self.update(key, Some(StoredValue::Double(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_types_are_separate() {
        let store = MemoryStore::new();
        store.set_string("a", "1.5").unwrap();
        store.set_double("b", 2.5).unwrap();
        assert_eq!(store.get_string("a").as_deref(), Some("1.5"));
        assert_eq!(store.get_double("a"), None);
        assert_eq!(store.get_double("b"), Some(2.5));
        assert!(store.contains("b"));
        store.remove("b").unwrap();
        assert!(!store.contains("b"));
    }

    #[test]
    fn test_bool_helpers() {
        let store = MemoryStore::new();
        assert_eq!(store.get_bool("flag"), None);
        store.set_bool("flag", true).unwrap();
        assert_eq!(store.get_bool("flag"), Some(true));
    }

    #[test]
    fn test_non_finite_rejected() {
        let store = MemoryStore::new();
        assert!(store.set_double("x", f64::NAN).is_err());
        assert!(store.is_empty());
    }
}
