//! The queryable side of the background indexer.
//!
//! [`FileSymbols`] accumulates the freshest per-file slabs, [`MemIndex`] is an
//! immutable snapshot built from them, and [`SwapIndex`] publishes successive
//! generations to readers by atomic pointer swap.

mod file_symbols;
mod mem_index;
mod swap;

pub use file_symbols::{FileSlabs, FileSymbols};
pub use mem_index::MemIndex;
pub use swap::{IndexSnapshot, SwapIndex};

use cinder_core::SymbolId;
use cinder_symbols::{Ref, RelationKind, Symbol};

/// Build mode for the queryable index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
    /// Optimized for query quality: merges duplicate symbols across files and
    /// folds reference counts into popularity. Costs more to build.
    Heavy,
    /// Cheap concatenating build used for the immediate per-TU refresh;
    /// skips popularity counting.
    Light,
}

/// What to do when the same symbol id appears in several files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateHandling {
    /// Merge records, preferring canonical declarations and definitions.
    Merge,
    /// Keep the first record seen.
    PickOne,
}

/// Read surface of a published index generation.
///
/// Implementations are immutable; queries never observe a partially built
/// generation.
pub trait SymbolIndex: Send + Sync {
    /// All symbols whose name matches `name` exactly.
    fn lookup(&self, name: &str) -> Vec<Symbol>;

    /// All references recorded for `id`.
    fn refs(&self, id: SymbolId) -> Vec<Ref>;

    /// Objects of all `predicate` relations whose subject is `subject`.
    fn relations(&self, subject: SymbolId, predicate: RelationKind) -> Vec<SymbolId>;

    /// Rough, stable estimate of the heap bytes held by this generation.
    fn estimate_memory_usage(&self) -> usize;
}
