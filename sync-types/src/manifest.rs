//! Manifest entries: the content-addressed snapshot of a local vault.

use serde::{Deserialize, Serialize};

/// One file in a local manifest.
///
/// `hash` is the lowercase hex SHA-256 of the file's plaintext, never of an
/// encrypted form, so devices with different key state still compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Vault-relative path using `/` separators. Unique within a vault.
    pub path: String,
    /// Hex digest of the plaintext content.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time in epoch seconds.
    pub modified_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_entry_wire_shape() {
        let entry = ManifestEntry {
            path: "notes/a.md".into(),
            hash: "ab".repeat(32),
            size: 12,
            modified_at: 1_700_000_000,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["path"], "notes/a.md");
        assert_eq!(json["size"], 12);
        assert_eq!(json["modified_at"], 1_700_000_000u64);
    }
}
