//! In-memory storage backend.

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use serde_json::Value;

use crate::error::StorageError;
use crate::traits::{Storage, StoreItems};

/// In-memory storage using a papaya lock-free HashMap.
///
/// Intended for tests and single-process hosts; contents are lost when the
/// value is dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: PapayaHashMap<String, Value>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored items.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        let data = self.data.pin();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn write(&self, changes: StoreItems) -> Result<(), StorageError> {
        if changes.keys().any(String::is_empty) {
            return Err(StorageError::invalid_key("storage keys must not be empty"));
        }

        let data = self.data.pin();
        for (key, value) in changes {
            data.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let data = self.data.pin();
        for key in keys {
            if data.remove(key).is_none() {
                tracing::trace!(key = %key, "Delete of missing key ignored");
            }
        }
        Ok(())
    }
}
