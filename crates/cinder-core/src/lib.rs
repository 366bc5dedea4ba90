//! Shared, dependency-minimized core types used across Cinder.

pub mod path;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The current Cinder version.
///
/// Used for on-disk shard compatibility checks.
pub const CINDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Width of a [`FileDigest`] in bytes.
pub const FILE_DIGEST_LEN: usize = 20;

/// A fixed-width content hash of a file's bytes.
///
/// The value is opaque and compared bytewise; the all-zero digest is a
/// sentinel meaning "absent" and is never produced by hashing real content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileDigest([u8; FILE_DIGEST_LEN]);

impl FileDigest {
    /// The "absent" sentinel.
    pub const ZERO: FileDigest = FileDigest([0; FILE_DIGEST_LEN]);

    pub const fn from_bytes(raw: [u8; FILE_DIGEST_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; FILE_DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Default for FileDigest {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileDigest").field(&hex::encode(self.0)).finish()
    }
}

/// A stable identifier for a symbol.
///
/// Ids are derived from a symbol's globally unique spelling (for C-family
/// code, its USR) so that the same symbol observed from different translation
/// units maps to the same id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(u64);

impl SymbolId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Derive a stable id from a symbol's unique spelling.
    pub fn of(unique_name: &[u8]) -> Self {
        let hash = Sha256::digest(unique_name);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&hash[..8]);
        Self(u64::from_le_bytes(raw))
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({:016x})", self.0)
    }
}
