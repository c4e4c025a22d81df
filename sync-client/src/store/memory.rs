//! In-memory vault store for testing.
//!
//! Allows pre-seeding files, controlling mtimes and failing reads, and
//! counts reads so hash-cache behavior can be verified.

use super::{parent_dir, FileMeta, StoreError, VaultStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    mtime: u64,
}

#[derive(Debug, Default)]
struct MemoryVaultStoreInner {
    files: BTreeMap<String, MemFile>,
    dirs: BTreeSet<String>,
    clock: u64,
    reads: u64,
    unreadable: HashSet<String>,
    fail_list: Option<String>,
}

/// In-memory vault store for testing.
///
/// Clones share state, like [`crate::remote::MockRemote`].
#[derive(Debug, Default, Clone)]
pub struct MemoryVaultStore {
    inner: Arc<Mutex<MemoryVaultStoreInner>>,
}

impl MemoryVaultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file, bumping the logical clock for its mtime.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let mtime = inner.clock;
        inner.files.insert(
            path.to_string(),
            MemFile {
                data: data.into(),
                mtime,
            },
        );
    }

    /// File content, if present.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.files.get(path).map(|f| f.data.clone())
    }

    /// Remove a file directly (simulates a user deletion).
    pub fn delete(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(path);
    }

    /// Override a file's mtime.
    pub fn set_mtime(&self, path: &str, mtime: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(file) = inner.files.get_mut(path) {
            file.mtime = mtime;
        }
    }

    /// Replace content without touching the mtime (simulates a tool that
    /// preserves timestamps).
    pub fn replace_keep_mtime(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(file) = inner.files.get_mut(path) {
            file.data = data.into();
        }
    }

    /// Sorted list of file paths.
    pub fn paths(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.files.keys().cloned().collect()
    }

    /// Folders created through the store.
    pub fn dirs(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.dirs.iter().cloned().collect()
    }

    /// Number of `read()` calls so far.
    pub fn read_count(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.reads
    }

    /// Make every read of `path` fail.
    pub fn make_unreadable(&self, path: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.unreadable.insert(path.to_string());
    }

    /// Cause the next `list_files()` to fail.
    pub fn fail_next_list(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_list = Some(error.to_string());
    }
}

fn io(path: &str, msg: &str) -> StoreError {
    StoreError::Io {
        path: path.to_string(),
        source: std::io::Error::other(msg.to_string()),
    }
}

#[async_trait]
impl VaultStore for MemoryVaultStore {
    async fn list_files(&self) -> Result<Vec<FileMeta>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_list.take() {
            return Err(io("", &error));
        }
        Ok(inner
            .files
            .iter()
            .map(|(path, f)| FileMeta {
                path: path.clone(),
                size: f.data.len() as u64,
                mtime: f.mtime,
            })
            .collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.reads += 1;
        if inner.unreadable.contains(path) {
            return Err(io(path, "permission denied"));
        }
        inner
            .files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        {
            let inner = self.inner.lock().unwrap();
            if let Some(parent) = parent_dir(path) {
                let known = inner.dirs.contains(parent)
                    || inner
                        .files
                        .keys()
                        .any(|p| p.starts_with(&format!("{parent}/")));
                if !known {
                    return Err(StoreError::NotFound(parent.to_string()));
                }
            }
        }
        self.insert(path, data.to_vec());
        Ok(())
    }

    async fn create_dir_all(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            inner.dirs.insert(current.clone());
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.delete(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.files.contains_key(path))
    }
}
