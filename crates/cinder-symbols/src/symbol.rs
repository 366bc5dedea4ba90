use cinder_core::SymbolId;
use serde::{Deserialize, Serialize};

/// A position inside a source file, addressed by URI.
///
/// Only `file_uri` is meaningful to the indexer core; line and column ride
/// along for consumers of the published index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub file_uri: String,
    /// 0-based line.
    pub line: u32,
    /// 0-based column.
    pub column: u32,
}

impl SymbolLocation {
    pub fn new(file_uri: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file_uri: file_uri.into(),
            line,
            column,
        }
    }
}

/// Coarse classification of a symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Data,
    Class,
    Macro,
    Unknown,
}

/// A single indexed symbol.
///
/// `canonical_declaration` and `definition` may each be absent; a symbol with
/// neither is droppable by the partitioning step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub canonical_declaration: Option<SymbolLocation>,
    pub definition: Option<SymbolLocation>,
    /// Popularity metric: how often this symbol was referenced from
    /// translation-unit main files.
    pub references: u32,
}

impl Symbol {
    pub fn new(id: SymbolId, name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            canonical_declaration: None,
            definition: None,
            references: 0,
        }
    }
}

/// How a symbol occurrence relates to the symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Declaration,
    Definition,
    Reference,
}

/// One occurrence of a symbol in a source file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ref {
    pub location: SymbolLocation,
    pub kind: RefKind,
}

/// How two symbols relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    BaseOf,
    OverriddenBy,
}

/// A subject-predicate-object fact about two symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub subject: SymbolId,
    pub predicate: RelationKind,
    pub object: SymbolId,
}
