//! Directory-backed [`FileStorage`].
//!
//! Files live flat under a single root directory; the [`StoragePath`] handle
//! is the bare file name. Writes go to a temp file in the same directory and
//! are then linked into place without clobbering, so a crash mid-write leaves
//! at most an anonymous temp file and never a truncated artifact.

use super::{validate_name, FileStorage, StoragePath};
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores files in a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Use `root` as the storage directory. It is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &StoragePath) -> Result<PathBuf, StorageError> {
        validate_name(path.as_str())?;
        Ok(self.root.join(path.as_str()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Blocking create-new write: temp file in `root`, fsync, then persist.
fn write_new_blocking(root: &Path, target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    std::fs::create_dir_all(root).map_err(|e| io_error(root, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| io_error(root, e))?;
    tmp.write_all(bytes).map_err(|e| io_error(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(tmp.path(), e))?;

    // On failure the temp file is dropped (and removed) with the error.
    tmp.persist_noclobber(target).map_err(|e| {
        if e.error.kind() == ErrorKind::AlreadyExists {
            StorageError::AlreadyExists(
                target
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            )
        } else {
            io_error(target, e.error)
        }
    })?;
    Ok(())
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<StoragePath, StorageError> {
        validate_name(name)?;
        let root = self.root.clone();
        let target = self.root.join(name);
        let data = bytes.to_vec();

        tokio::task::spawn_blocking(move || write_new_blocking(&root, &target, &data))
            .await
            .map_err(|e| StorageError::Io {
                path: name.to_string(),
                source: std::io::Error::other(format!("write task panicked: {e}")),
            })??;

        debug!("Stored {} ({} bytes)", name, bytes.len());
        Ok(StoragePath::new(name))
    }

    async fn read_file(&self, path: &StoragePath) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                io_error(&full, e)
            }
        })
    }

    async fn delete_file(&self, path: &StoragePath) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&full, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_in_directory() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStorage::new(dir.path().join("nested"));

        let path = store.write_file("a.pdf", b"%PDF-1.5").await.unwrap();
        assert_eq!(path.as_str(), "a.pdf");
        assert!(dir.path().join("nested/a.pdf").exists());
        assert_eq!(store.read_file(&path).await.unwrap(), b"%PDF-1.5");

        store.delete_file(&path).await.unwrap();
        assert!(!dir.path().join("nested/a.pdf").exists());
        store.delete_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn existing_file_is_not_clobbered() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStorage::new(dir.path());
        store.write_file("a.pdf", b"first").await.unwrap();

        let err = store.write_file("a.pdf", b"second").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)), "got {err:?}");
        assert_eq!(std::fs::read(dir.path().join("a.pdf")).unwrap(), b"first");

        // No temp files left behind.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStorage::new(dir.path());
        let err = store
            .read_file(&StoragePath::new("../secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)));
    }
}
