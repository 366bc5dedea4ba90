//! Frozen, bulk-built collections of index records.
//!
//! Slabs are constructed once through their builders and never mutated
//! afterwards, so they can be shared across threads behind an `Arc` without
//! locking.

use std::collections::{BTreeMap, HashMap};

use cinder_core::SymbolId;
use serde::{Deserialize, Serialize};

use crate::symbol::{Ref, Relation, Symbol};

/// An immutable, id-sorted collection of symbols.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSlab {
    symbols: Vec<Symbol>,
}

impl SymbolSlab {
    pub fn builder() -> SymbolSlabBuilder {
        SymbolSlabBuilder::default()
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols
            .binary_search_by_key(&id, |symbol| symbol.id)
            .ok()
            .map(|index| &self.symbols[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SymbolSlabBuilder {
    symbols: HashMap<SymbolId, Symbol>,
}

impl SymbolSlabBuilder {
    /// Inserts a symbol, merging with a previously inserted record for the
    /// same id.
    ///
    /// Merging prefers the record that carries a definition, fills in a
    /// missing canonical declaration from the other record, and keeps the
    /// larger reference count so repeated insertion stays idempotent.
    pub fn insert(&mut self, symbol: Symbol) {
        use std::collections::hash_map::Entry;
        match self.symbols.entry(symbol.id) {
            Entry::Vacant(slot) => {
                slot.insert(symbol);
            }
            Entry::Occupied(mut slot) => {
                let merged = merge_symbols(slot.get(), &symbol);
                slot.insert(merged);
            }
        }
    }

    pub fn build(self) -> SymbolSlab {
        let mut symbols: Vec<Symbol> = self.symbols.into_values().collect();
        symbols.sort_by_key(|symbol| symbol.id);
        SymbolSlab { symbols }
    }
}

fn merge_symbols(left: &Symbol, right: &Symbol) -> Symbol {
    let (preferred, other) = if right.definition.is_some() && left.definition.is_none() {
        (right, left)
    } else {
        (left, right)
    };
    let mut merged = preferred.clone();
    if merged.canonical_declaration.is_none() {
        merged.canonical_declaration = other.canonical_declaration.clone();
    }
    if merged.definition.is_none() {
        merged.definition = other.definition.clone();
    }
    merged.references = left.references.max(right.references);
    merged
}

/// An immutable map from symbol id to the references observed for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSlab {
    refs: BTreeMap<SymbolId, Vec<Ref>>,
    num_refs: usize,
}

impl RefSlab {
    pub fn builder() -> RefSlabBuilder {
        RefSlabBuilder::default()
    }

    pub fn get(&self, id: SymbolId) -> &[Ref] {
        self.refs.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &[Ref])> {
        self.refs.iter().map(|(id, refs)| (*id, refs.as_slice()))
    }

    /// Total number of references across all symbols.
    pub fn num_refs(&self) -> usize {
        self.num_refs
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RefSlabBuilder {
    refs: BTreeMap<SymbolId, Vec<Ref>>,
}

impl RefSlabBuilder {
    pub fn insert(&mut self, id: SymbolId, reference: Ref) {
        self.refs.entry(id).or_default().push(reference);
    }

    pub fn build(self) -> RefSlab {
        let mut refs = self.refs;
        let mut num_refs = 0;
        for bucket in refs.values_mut() {
            bucket.sort();
            bucket.dedup();
            num_refs += bucket.len();
        }
        RefSlab { refs, num_refs }
    }
}

/// An immutable, sorted collection of relations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSlab {
    relations: Vec<Relation>,
}

impl RelationSlab {
    pub fn builder() -> RelationSlabBuilder {
        RelationSlabBuilder::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RelationSlabBuilder {
    relations: Vec<Relation>,
}

impl RelationSlabBuilder {
    pub fn insert(&mut self, relation: Relation) {
        self.relations.push(relation);
    }

    pub fn build(self) -> RelationSlab {
        let mut relations = self.relations;
        relations.sort();
        relations.dedup();
        RelationSlab { relations }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{RefKind, RelationKind, SymbolKind, SymbolLocation};

    fn location(uri: &str, line: u32) -> SymbolLocation {
        SymbolLocation::new(uri, line, 0)
    }

    #[test]
    fn symbol_builder_merges_declaration_and_definition() {
        let id = SymbolId::of(b"foo");
        let mut declared = Symbol::new(id, "foo", SymbolKind::Function);
        declared.canonical_declaration = Some(location("file:///h.h", 1));

        let mut defined = Symbol::new(id, "foo", SymbolKind::Function);
        defined.definition = Some(location("file:///a.cpp", 4));

        let mut builder = SymbolSlab::builder();
        builder.insert(declared.clone());
        builder.insert(defined);
        let slab = builder.build();

        assert_eq!(slab.len(), 1);
        let merged = slab.get(id).unwrap();
        assert_eq!(
            merged.canonical_declaration.as_ref().unwrap().file_uri,
            "file:///h.h"
        );
        assert_eq!(merged.definition.as_ref().unwrap().file_uri, "file:///a.cpp");
    }

    #[test]
    fn symbol_builder_is_idempotent() {
        let id = SymbolId::of(b"x");
        let mut symbol = Symbol::new(id, "x", SymbolKind::Data);
        symbol.references = 3;

        let mut builder = SymbolSlab::builder();
        builder.insert(symbol.clone());
        builder.insert(symbol.clone());
        let slab = builder.build();
        assert_eq!(slab.len(), 1);
        assert_eq!(slab.get(id).unwrap().references, 3);
    }

    #[test]
    fn ref_builder_dedups_and_counts() {
        let id = SymbolId::of(b"x");
        let occurrence = Ref {
            location: location("file:///a.cpp", 2),
            kind: RefKind::Reference,
        };

        let mut builder = RefSlab::builder();
        builder.insert(id, occurrence.clone());
        builder.insert(id, occurrence.clone());
        builder.insert(
            id,
            Ref {
                location: location("file:///a.cpp", 9),
                kind: RefKind::Reference,
            },
        );
        let slab = builder.build();

        assert_eq!(slab.num_refs(), 2);
        assert_eq!(slab.get(id).len(), 2);
        assert!(slab.get(SymbolId::of(b"other")).is_empty());
    }

    #[test]
    fn relation_builder_sorts_and_dedups() {
        let relation = Relation {
            subject: SymbolId::of(b"base"),
            predicate: RelationKind::BaseOf,
            object: SymbolId::of(b"derived"),
        };
        let mut builder = RelationSlab::builder();
        builder.insert(relation);
        builder.insert(relation);
        assert_eq!(builder.build().len(), 1);
    }
}
