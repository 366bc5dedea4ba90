use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::digest::digest_bytes;
use crate::error::StoreError;
use crate::shard::{decode_shard, encode_shard, Shard};
use crate::util::{atomic_write, read_file_limited};

/// Directory shards are kept in, under a project's source root.
pub const SHARD_DIR_NAME: &str = ".cinder-index";

/// Persistent storage for shards, one instance per project source root.
///
/// Implementations must support concurrent `load_shard` / `store_shard`
/// calls on distinct paths; the indexer serializes writes to the same path.
pub trait ShardStorage: Send + Sync {
    /// The last stored shard for `source_path`, or `None` if absent or
    /// unreadable.
    fn load_shard(&self, source_path: &Path) -> Option<Shard>;

    /// Durably writes the shard for `source_path`.
    fn store_shard(&self, source_path: &Path, shard: &Shard) -> Result<(), StoreError>;
}

/// Maps a project source root to the storage responsible for it.
pub type ShardStorageFactory = Arc<dyn Fn(&Path) -> Arc<dyn ShardStorage> + Send + Sync>;

/// Disk-backed storage: one file per source path under
/// `<source_root>/.cinder-index/`.
///
/// File names combine the source file stem with a digest of its absolute
/// path, so `a/util.h` and `b/util.h` never collide while the directory stays
/// greppable.
#[derive(Debug)]
pub struct DiskShardStorage {
    root: PathBuf,
}

impl DiskShardStorage {
    pub fn new(source_root: &Path) -> Self {
        Self {
            root: source_root.join(SHARD_DIR_NAME),
        }
    }

    pub fn shard_path(&self, source_path: &Path) -> PathBuf {
        let stem = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let path_digest = digest_bytes(source_path.to_string_lossy().as_bytes());
        let prefix = hex::encode(&path_digest.as_bytes()[..8]);
        self.root.join(format!("{stem}.{prefix}.shard"))
    }
}

impl ShardStorage for DiskShardStorage {
    fn load_shard(&self, source_path: &Path) -> Option<Shard> {
        let path = self.shard_path(source_path);
        let bytes = read_file_limited(&path)?;
        let shard = decode_shard(&bytes);
        if shard.is_none() {
            tracing::debug!(
                target = "cinder.store",
                shard = %path.display(),
                "discarding unreadable shard"
            );
        }
        shard
    }

    fn store_shard(&self, source_path: &Path, shard: &Shard) -> Result<(), StoreError> {
        let bytes = encode_shard(shard)?;
        atomic_write(&self.shard_path(source_path), &bytes)
    }
}

/// Returns the production storage factory: disk-backed storage memoized per
/// source root.
///
/// The factory is process-wide configuration: create it once at startup and
/// treat it as immutable afterwards.
pub fn disk_storage_factory() -> ShardStorageFactory {
    let instances: Mutex<HashMap<PathBuf, Arc<dyn ShardStorage>>> = Mutex::new(HashMap::new());
    Arc::new(move |source_root: &Path| {
        let mut instances = instances.lock().expect("storage factory mutex poisoned");
        instances
            .entry(source_root.to_path_buf())
            .or_insert_with(|| Arc::new(DiskShardStorage::new(source_root)) as Arc<dyn ShardStorage>)
            .clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use cinder_core::SymbolId;
    use cinder_symbols::{Symbol, SymbolKind, SymbolSlab};

    fn shard_with_symbol(name: &str) -> Shard {
        let mut symbols = SymbolSlab::builder();
        symbols.insert(Symbol::new(SymbolId::of(name.as_bytes()), name, SymbolKind::Data));
        Shard {
            symbols: Some(symbols.build()),
            ..Shard::default()
        }
    }

    #[test]
    fn store_then_load_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = DiskShardStorage::new(tmp.path());
        let shard = shard_with_symbol("x");

        storage.store_shard(Path::new("/src/a.cpp"), &shard).unwrap();
        assert_eq!(storage.load_shard(Path::new("/src/a.cpp")).unwrap(), shard);
        assert!(storage.load_shard(Path::new("/src/other.cpp")).is_none());
    }

    #[test]
    fn same_stem_different_directories_do_not_collide() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = DiskShardStorage::new(tmp.path());

        storage
            .store_shard(Path::new("/a/util.h"), &shard_with_symbol("a"))
            .unwrap();
        storage
            .store_shard(Path::new("/b/util.h"), &shard_with_symbol("b"))
            .unwrap();

        let a = storage.load_shard(Path::new("/a/util.h")).unwrap();
        let b = storage.load_shard(Path::new("/b/util.h")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn torn_shards_load_as_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = DiskShardStorage::new(tmp.path());
        let source = Path::new("/src/a.cpp");

        storage.store_shard(source, &shard_with_symbol("x")).unwrap();
        let shard_file = storage.shard_path(source);
        let bytes = std::fs::read(&shard_file).unwrap();
        std::fs::write(&shard_file, &bytes[..bytes.len() / 2]).unwrap();

        assert!(storage.load_shard(source).is_none());
    }

    #[test]
    fn factory_memoizes_per_source_root() {
        let factory = disk_storage_factory();
        let first = factory(Path::new("/project"));
        let second = factory(Path::new("/project"));
        let other = factory(Path::new("/elsewhere"));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }
}
