//! Content hashing and manifest building.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use vaultsync_core::PathFilter;
use vaultsync_types::ManifestEntry;

use crate::store::{StoreError, VaultStore};

/// Lowercase hex SHA-256 of `data`.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HashCacheEntry {
    hash: String,
    mtime: u64,
    size: u64,
}

/// Per-path content hashes, trusted while `(mtime, size)` is unchanged.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: HashMap<String, HashCacheEntry>,
}

impl HashCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached hash if the file still has this mtime and size.
    pub fn lookup(&self, path: &str, mtime: u64, size: u64) -> Option<&str> {
        self.entries
            .get(path)
            .filter(|e| e.mtime == mtime && e.size == size)
            .map(|e| e.hash.as_str())
    }

    /// Record a freshly computed hash.
    pub fn insert(&mut self, path: &str, hash: String, mtime: u64, size: u64) {
        self.entries
            .insert(path.to_string(), HashCacheEntry { hash, mtime, size });
    }

    /// Drop entries for paths not in `keep`.
    pub fn retain_paths<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.entries.retain(|path, _| keep(path));
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshot the vault: every included file with its plaintext hash.
///
/// Excluded: hidden paths, the engine's state folder and anything `filter`
/// matches. A file that cannot be read is skipped with a warning; failure to
/// enumerate the vault is an error. Cache entries of vanished or excluded
/// paths are evicted.
pub async fn build_manifest<S: VaultStore + ?Sized>(
    store: &S,
    filter: &PathFilter,
    cache: &mut HashCache,
) -> Result<Vec<ManifestEntry>, StoreError> {
    let mut files = store.list_files().await?;
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut entries = Vec::with_capacity(files.len());
    for meta in files {
        if filter.is_excluded(&meta.path) {
            continue;
        }

        let hash = match cache.lookup(&meta.path, meta.mtime, meta.size) {
            Some(hash) => hash.to_string(),
            None => match store.read(&meta.path).await {
                Ok(data) => {
                    let hash = content_hash(&data);
                    cache.insert(&meta.path, hash.clone(), meta.mtime, meta.size);
                    hash
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {}: {}", meta.path, e);
                    continue;
                }
            },
        };

        entries.push(ManifestEntry {
            path: meta.path,
            hash,
            size: meta.size,
            modified_at: meta.mtime,
        });
    }

    let present: std::collections::HashSet<&str> =
        entries.iter().map(|e| e.path.as_str()).collect();
    cache.retain_paths(|p| present.contains(p));

    tracing::debug!("Manifest built: {} files", entries.len());
    Ok(entries)
}
