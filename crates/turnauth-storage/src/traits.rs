//! The key-value storage contract.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// A batch of stored items keyed by storage key.
pub type StoreItems = HashMap<String, Value>;

/// Key-value storage consumed by the authorization engine.
///
/// Implementations must be thread-safe (`Send + Sync`) and must treat missing
/// keys as empty results on `read` and as a no-op on `delete`.
///
/// # Example
///
/// ```ignore
/// use turnauth_storage::{MemoryStorage, Storage};
///
/// let storage = MemoryStorage::new();
/// let mut changes = StoreItems::new();
/// changes.insert("auth/msteams/user-1".to_string(), serde_json::json!({"id": "graph"}));
/// storage.write(changes).await?;
/// let items = storage.read(&["auth/msteams/user-1".to_string()]).await?;
/// ```
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads the given keys.
    ///
    /// Keys that do not exist are absent from the returned map.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing keys.
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError>;

    /// Writes (inserts or replaces) every item in `changes`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKey` for an empty key, or an
    /// infrastructure error if the backend fails.
    async fn write(&self, changes: StoreItems) -> Result<(), StorageError>;

    /// Deletes the given keys. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn delete(&self, keys: &[String]) -> Result<(), StorageError>;
}
