use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::mem_index::MemIndex;
use crate::SymbolIndex;

/// A handle to one published index generation.
///
/// Holding the handle keeps the generation alive even after a newer one is
/// published underneath it.
pub type IndexSnapshot = Arc<Box<dyn SymbolIndex>>;

/// Single-slot holder for the published index generation.
///
/// Readers take a snapshot handle that keeps its generation alive for the
/// duration of their query; writers replace the slot atomically. Readers are
/// wait-free.
pub struct SwapIndex {
    inner: ArcSwap<Box<dyn SymbolIndex>>,
}

impl SwapIndex {
    pub fn new(initial: Box<dyn SymbolIndex>) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    /// Publishes a new generation.
    pub fn reset(&self, index: Box<dyn SymbolIndex>) {
        self.inner.store(Arc::new(index));
    }

    /// Returns a handle to the current generation.
    pub fn snapshot(&self) -> IndexSnapshot {
        self.inner.load_full()
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.snapshot().estimate_memory_usage()
    }
}

impl Default for SwapIndex {
    fn default() -> Self {
        Self::new(Box::new(MemIndex::default()))
    }
}
