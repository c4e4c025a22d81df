//! Local vault store abstraction.
//!
//! The engine never touches the filesystem directly. It enumerates, reads
//! and writes through a [`VaultStore`], with vault-relative `/`-separated
//! paths:
//! - [`FsVaultStore`] maps paths onto a directory
//! - [`MemoryVaultStore`] keeps everything in memory for tests

mod fs;
mod memory;

pub use fs::FsVaultStore;
pub use memory::MemoryVaultStore;

use async_trait::async_trait;
use thiserror::Error;

/// Local store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path escapes the vault or is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Underlying I/O failure.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Vault-relative path.
        path: String,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
}

/// Metadata of one file, as seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Vault-relative path using `/` separators.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time in epoch seconds.
    pub mtime: u64,
}

/// Binary file access to the local vault.
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Files in the vault. Stores may leave out hidden entries; any other
    /// filtering is the caller's job.
    async fn list_files(&self) -> Result<Vec<FileMeta>, StoreError>;

    /// Read a file's bytes.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Write a file, replacing existing content. Parent folders must exist.
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Create a folder and all missing ancestors.
    async fn create_dir_all(&self, path: &str) -> Result<(), StoreError>;

    /// Remove a file. Removing a missing file is not an error.
    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Whether a file exists.
    async fn exists(&self, path: &str) -> Result<bool, StoreError>;
}

/// Parent folder of a vault path, if it has one.
pub fn parent_dir(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx]).filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dir_of_nested_path() {
        assert_eq!(parent_dir("a/b/c.md"), Some("a/b"));
        assert_eq!(parent_dir("c.md"), None);
        assert_eq!(parent_dir("/c.md"), None);
    }
}
