use std::io;
use std::path::Path;

use cinder_core::{FileDigest, FILE_DIGEST_LEN};
use cinder_vfs::FileSystem;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Digests a byte buffer.
///
/// SHA-256 truncated to the fixed digest width. The truncation keeps shards
/// compact while staying far past collision resistance for source-sized
/// inputs.
pub fn digest_bytes(bytes: &[u8]) -> FileDigest {
    let hash = Sha256::digest(bytes);
    let mut raw = [0u8; FILE_DIGEST_LEN];
    raw.copy_from_slice(&hash[..FILE_DIGEST_LEN]);
    FileDigest::from_bytes(raw)
}

/// Digests the current contents of `path` as seen through `fs`.
pub fn digest_file(fs: &dyn FileSystem, path: &Path) -> Result<FileDigest, StoreError> {
    let bytes = fs.read_bytes(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            StoreError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io(err)
        }
    })?;
    Ok(digest_bytes(&bytes))
}
