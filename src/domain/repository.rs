use async_trait::async_trait;

use crate::error::StorageError;

/// Narrow persistence contract the todo store depends on: one string value
/// per key, whole-value replace on `set`.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}
