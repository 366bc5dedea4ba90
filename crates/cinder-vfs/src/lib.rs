//! File system abstraction for Cinder.
//!
//! Indexing reads every file through a [`FileSystem`] handle so workers can
//! run against the local disk in production and an in-memory tree in tests.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File system abstraction.
///
/// The trait is intentionally small so it can be implemented for different
/// backends (local FS, in-memory trees, future overlays).
pub trait FileSystem: Send + Sync {
    /// Reads the file contents as raw bytes.
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Returns whether a path exists.
    fn exists(&self, path: &Path) -> bool;
}

/// Local OS file system implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory file system keyed by absolute path.
///
/// Files can be added and overwritten mid-test to simulate edits between
/// indexing passes.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .expect("memory fs mutex poisoned")
            .insert(path.into(), contents.into());
    }

    /// Removes a file; subsequent reads observe `NotFound`.
    pub fn remove(&self, path: &Path) {
        self.files
            .lock()
            .expect("memory fs mutex poisoned")
            .remove(path);
    }
}

impl FileSystem for MemoryFs {
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .expect("memory fs mutex poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path.display()))
            })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .expect("memory fs mutex poisoned")
            .contains_key(path)
    }
}
