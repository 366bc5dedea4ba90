use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use cinder_symbols::{RefSlab, RelationSlab, SymbolSlab};

use crate::mem_index::MemIndex;
use crate::{DuplicateHandling, IndexType, SymbolIndex};

/// The freshest slabs known for one file.
#[derive(Clone, Debug, Default)]
pub struct FileSlabs {
    pub symbols: Option<Arc<SymbolSlab>>,
    pub refs: Option<Arc<RefSlab>>,
    pub relations: Option<Arc<RelationSlab>>,
    /// True iff the file was indexed as a translation-unit main file, so its
    /// references should count towards symbol popularity.
    pub counts_refs: bool,
}

/// Thread-safe store of the most recent slabs per absolute file path.
///
/// `update` replaces a file's entry wholesale; older generations are dropped
/// once no built index still holds their `Arc`s.
#[derive(Debug, Default)]
pub struct FileSymbols {
    inner: Mutex<HashMap<PathBuf, FileSlabs>>,
}

impl FileSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slabs stored for `path`.
    pub fn update(
        &self,
        path: &Path,
        symbols: Option<Arc<SymbolSlab>>,
        refs: Option<Arc<RefSlab>>,
        relations: Option<Arc<RelationSlab>>,
        counts_refs: bool,
    ) {
        self.lock_inner().insert(
            path.to_path_buf(),
            FileSlabs {
                symbols,
                refs,
                relations,
                counts_refs,
            },
        );
    }

    /// Builds an immutable index over a snapshot of the current entries.
    ///
    /// The snapshot is taken under the lock; the build itself runs without
    /// it, so concurrent updates only affect later generations.
    pub fn build_index(
        &self,
        kind: IndexType,
        duplicates: DuplicateHandling,
    ) -> Box<dyn SymbolIndex> {
        let snapshot: Vec<FileSlabs> = self.lock_inner().values().cloned().collect();
        Box::new(MemIndex::build(&snapshot, kind, duplicates))
    }

    #[track_caller]
    fn lock_inner(&self) -> MutexGuard<'_, HashMap<PathBuf, FileSlabs>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "cinder.index",
                    file = loc.file(),
                    line = loc.line(),
                    error = %err,
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cinder_core::SymbolId;
    use cinder_symbols::{Symbol, SymbolKind};

    fn slab_with(name: &str) -> Arc<SymbolSlab> {
        let mut builder = SymbolSlab::builder();
        builder.insert(Symbol::new(SymbolId::of(name.as_bytes()), name, SymbolKind::Data));
        Arc::new(builder.build())
    }

    #[test]
    fn update_replaces_previous_entry() {
        let store = FileSymbols::new();
        let path = Path::new("/a.cpp");

        store.update(path, Some(slab_with("x")), None, None, true);
        store.update(path, Some(slab_with("y")), None, None, true);

        let index = store.build_index(IndexType::Light, DuplicateHandling::Merge);
        assert!(index.lookup("x").is_empty());
        assert_eq!(index.lookup("y").len(), 1);
    }

    #[test]
    fn built_indexes_are_snapshots() {
        let store = FileSymbols::new();
        store.update(Path::new("/a.cpp"), Some(slab_with("x")), None, None, true);

        let before = store.build_index(IndexType::Light, DuplicateHandling::Merge);
        store.update(Path::new("/b.cpp"), Some(slab_with("y")), None, None, true);

        assert!(before.lookup("y").is_empty());
        let after = store.build_index(IndexType::Light, DuplicateHandling::Merge);
        assert_eq!(after.lookup("y").len(), 1);
    }
}
