//! Durable file storage abstraction.
//!
//! The engine never touches the filesystem directly: every byte it reads or
//! writes goes through [`FileStorage`], so classification, rendering, splicing
//! and ordering can be exercised against [`memory::InMemoryStorage`] without a
//! real disk.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod local;
pub mod memory;

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use local::LocalFileStorage;
pub use memory::InMemoryStorage;

/// Opaque handle to stored file bytes, as returned by
/// [`FileStorage::write_file`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoragePath(String);

impl StoragePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Abstract file store for uploaded sources and consolidated artifacts.
///
/// # Operations
///
/// | Method | Semantics |
/// |--------|-----------|
/// | `write_file` | Create a new file; fails with [`StorageError::AlreadyExists`] rather than overwrite |
/// | `read_file` | Full contents of a stored file |
/// | `delete_file` | Remove a file; deleting a missing file is **not** an error |
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Write `bytes` under `name`, returning the handle to store in the registry.
    ///
    /// The write is all-or-nothing: a reader never observes a partial file.
    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<StoragePath, StorageError>;

    /// Read the full contents of a stored file.
    async fn read_file(&self, path: &StoragePath) -> Result<Vec<u8>, StorageError>;

    /// Delete a stored file. Idempotent.
    async fn delete_file(&self, path: &StoragePath) -> Result<(), StorageError>;
}

/// Reject names that could escape a storage root or are not plain filenames.
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        Err(StorageError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_plain() {
        assert!(validate_name("consolidated_1_2025-01-01.pdf").is_ok());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
    }
}
