//! Snapshot identity of the inputs that shape cached series.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex SHA-256 over every input part, each part length-prefixed so that
/// moving bytes between parts changes the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn from_parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            let bytes = part.as_ref();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        SnapshotId(format!("{:x}", hasher.finalize()))
    }

    /// Wraps an identity read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        SnapshotId(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
