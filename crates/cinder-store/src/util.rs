//! On-disk encoding helpers shared by the shard storage.

use std::fs;
use std::io::Write;
use std::path::Path;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Ceiling on the size of any shard payload read back from disk.
///
/// A corrupted length prefix must degrade to a cache miss, not a giant
/// allocation.
pub const SHARD_PAYLOAD_LIMIT_BYTES: u64 = 64 << 20;

/// Fixed-width little-endian encoding, so identical shards always produce
/// identical bytes.
fn codec() -> impl bincode::Options {
    bincode::options()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(codec().serialize(value)?)
}

pub(crate) fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(codec()
        .with_limit(SHARD_PAYLOAD_LIMIT_BYTES)
        .deserialize(bytes)?)
}

/// Reads a whole file, treating anything over the payload ceiling as absent.
pub(crate) fn read_file_limited(path: &Path) -> Option<Vec<u8>> {
    if fs::metadata(path).ok()?.len() > SHARD_PAYLOAD_LIMIT_BYTES {
        return None;
    }
    // The file can grow between the metadata check and the read; re-check
    // what actually came back.
    fs::read(path)
        .ok()
        .filter(|bytes| bytes.len() as u64 <= SHARD_PAYLOAD_LIMIT_BYTES)
}

/// Writes `bytes` to `path` through a sibling temp file and an atomic
/// rename.
///
/// Readers observe either the previous contents or the new ones, never a
/// tear. The temp file is cleaned up automatically if anything fails before
/// the rename; `persist` handles the platform differences around renaming
/// over an existing destination.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_and_cleans_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("nested").join("payload.bin");

        atomic_write(&dest, b"first").unwrap();
        atomic_write(&dest, b"second").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"second");

        let entries: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1, "only the destination file remains");
    }

    #[test]
    fn oversized_files_read_as_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("small.bin");
        fs::write(&path, b"ok").unwrap();
        assert_eq!(read_file_limited(&path).unwrap(), b"ok");
        assert!(read_file_limited(&tmp.path().join("missing.bin")).is_none());
    }
}
