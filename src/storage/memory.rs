//! In-memory [`FileStorage`] implementation for tests and embedding.

use super::{validate_name, FileStorage, StoragePath};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Stores file bytes in a `HashMap` behind a `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a file is currently stored at `path`.
    pub fn contains(&self, path: &StoragePath) -> bool {
        self.read().contains_key(path.as_str())
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned lock only means another thread panicked mid-operation; every
    // operation here leaves the map consistent, so the data is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FileStorage for InMemoryStorage {
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<StoragePath, StorageError> {
        validate_name(name)?;
        let mut files = self.write();
        if files.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        files.insert(name.to_string(), bytes.to_vec());
        Ok(StoragePath::new(name))
    }

    async fn read_file(&self, path: &StoragePath) -> Result<Vec<u8>, StorageError> {
        self.read()
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn delete_file(&self, path: &StoragePath) -> Result<(), StorageError> {
        self.write().remove(path.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_delete() {
        let store = InMemoryStorage::new();
        let path = store.write_file("a.pdf", b"%PDF").await.unwrap();
        assert_eq!(store.read_file(&path).await.unwrap(), b"%PDF");

        store.delete_file(&path).await.unwrap();
        assert!(store.is_empty());
        // Deleting again is fine.
        store.delete_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn write_never_overwrites() {
        let store = InMemoryStorage::new();
        store.write_file("a.pdf", b"one").await.unwrap();
        let err = store.write_file("a.pdf", b"two").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        let path = StoragePath::new("a.pdf");
        assert_eq!(store.read_file(&path).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let store = InMemoryStorage::new();
        let err = store.read_file(&StoragePath::new("nope")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
