//! Symbol, reference and relation records plus the containers the indexer
//! moves them around in: frozen slabs and the per-file include graph.

mod include_graph;
mod slab;
mod symbol;

pub use include_graph::{IncludeGraph, IncludeGraphNode, SourceFlags};
pub use slab::{
    RefSlab, RefSlabBuilder, RelationSlab, RelationSlabBuilder, SymbolSlab, SymbolSlabBuilder,
};
pub use symbol::{Ref, RefKind, Relation, RelationKind, Symbol, SymbolKind, SymbolLocation};
