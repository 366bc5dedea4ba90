use std::collections::HashMap;
use std::mem;

use cinder_core::SymbolId;
use cinder_symbols::{Ref, Relation, RelationKind, Symbol};

use crate::file_symbols::FileSlabs;
use crate::{DuplicateHandling, IndexType, SymbolIndex};

/// An immutable in-memory index over a snapshot of per-file slabs.
#[derive(Debug, Default)]
pub struct MemIndex {
    symbols: HashMap<SymbolId, Symbol>,
    by_name: HashMap<String, Vec<SymbolId>>,
    refs: HashMap<SymbolId, Vec<Ref>>,
    relations: HashMap<(SymbolId, RelationKind), Vec<SymbolId>>,
    estimated_bytes: usize,
}

impl MemIndex {
    /// Builds an index generation from a slab snapshot.
    ///
    /// `Heavy` additionally dedups references and folds per-TU reference
    /// counts into symbol popularity; `Light` concatenates as-is.
    pub fn build(files: &[FileSlabs], kind: IndexType, duplicates: DuplicateHandling) -> MemIndex {
        let mut symbols: HashMap<SymbolId, Symbol> = HashMap::new();
        for slabs in files {
            let Some(symbol_slab) = &slabs.symbols else {
                continue;
            };
            for symbol in symbol_slab.iter() {
                use std::collections::hash_map::Entry;
                match symbols.entry(symbol.id) {
                    Entry::Vacant(slot) => {
                        slot.insert(symbol.clone());
                    }
                    Entry::Occupied(mut slot) => match duplicates {
                        DuplicateHandling::Merge => {
                            let merged = merge_symbols(slot.get(), symbol);
                            slot.insert(merged);
                        }
                        DuplicateHandling::PickOne => {}
                    },
                }
            }
        }

        let mut refs: HashMap<SymbolId, Vec<Ref>> = HashMap::new();
        for slabs in files {
            let Some(ref_slab) = &slabs.refs else {
                continue;
            };
            for (id, bucket) in ref_slab.iter() {
                refs.entry(id).or_default().extend_from_slice(bucket);
            }
            if kind == IndexType::Heavy && slabs.counts_refs {
                for (id, bucket) in ref_slab.iter() {
                    if let Some(symbol) = symbols.get_mut(&id) {
                        symbol.references = symbol.references.saturating_add(bucket.len() as u32);
                    }
                }
            }
        }
        if kind == IndexType::Heavy {
            for bucket in refs.values_mut() {
                bucket.sort();
                bucket.dedup();
            }
        }

        let mut relations: HashMap<(SymbolId, RelationKind), Vec<SymbolId>> = HashMap::new();
        for slabs in files {
            let Some(relation_slab) = &slabs.relations else {
                continue;
            };
            for Relation {
                subject,
                predicate,
                object,
            } in relation_slab.iter()
            {
                relations
                    .entry((*subject, *predicate))
                    .or_default()
                    .push(*object);
            }
        }
        for bucket in relations.values_mut() {
            bucket.sort();
            bucket.dedup();
        }

        let mut by_name: HashMap<String, Vec<SymbolId>> = HashMap::new();
        for symbol in symbols.values() {
            by_name.entry(symbol.name.clone()).or_default().push(symbol.id);
        }
        for bucket in by_name.values_mut() {
            bucket.sort();
        }

        let estimated_bytes = estimate_bytes(&symbols, &by_name, &refs, &relations);
        MemIndex {
            symbols,
            by_name,
            refs,
            relations,
            estimated_bytes,
        }
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

fn estimate_bytes(
    symbols: &HashMap<SymbolId, Symbol>,
    by_name: &HashMap<String, Vec<SymbolId>>,
    refs: &HashMap<SymbolId, Vec<Ref>>,
    relations: &HashMap<(SymbolId, RelationKind), Vec<SymbolId>>,
) -> usize {
    let symbol_bytes: usize = symbols
        .values()
        .map(|symbol| {
            mem::size_of::<Symbol>()
                + symbol.name.len()
                + location_bytes(&symbol.canonical_declaration)
                + location_bytes(&symbol.definition)
        })
        .sum();
    let name_bytes: usize = by_name
        .iter()
        .map(|(name, ids)| name.len() + ids.len() * mem::size_of::<SymbolId>())
        .sum();
    let ref_bytes: usize = refs
        .values()
        .map(|bucket| {
            bucket
                .iter()
                .map(|r| mem::size_of::<Ref>() + r.location.file_uri.len())
                .sum::<usize>()
        })
        .sum();
    let relation_bytes: usize = relations
        .values()
        .map(|bucket| bucket.len() * mem::size_of::<SymbolId>())
        .sum();
    symbol_bytes + name_bytes + ref_bytes + relation_bytes
}

fn location_bytes(location: &Option<cinder_symbols::SymbolLocation>) -> usize {
    location.as_ref().map_or(0, |l| l.file_uri.len())
}

impl SymbolIndex for MemIndex {
    fn lookup(&self, name: &str) -> Vec<Symbol> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.symbols.get(id).cloned())
            .collect()
    }

    fn refs(&self, id: SymbolId) -> Vec<Ref> {
        self.refs.get(&id).cloned().unwrap_or_default()
    }

    fn relations(&self, subject: SymbolId, predicate: RelationKind) -> Vec<SymbolId> {
        self.relations
            .get(&(subject, predicate))
            .cloned()
            .unwrap_or_default()
    }

    fn estimate_memory_usage(&self) -> usize {
        self.estimated_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cinder_symbols::{RefKind, RefSlab, SymbolKind, SymbolLocation, SymbolSlab};

    fn file_with_symbol(symbol: Symbol, counts_refs: bool) -> FileSlabs {
        let mut builder = SymbolSlab::builder();
        builder.insert(symbol);
        FileSlabs {
            symbols: Some(Arc::new(builder.build())),
            refs: None,
            relations: None,
            counts_refs,
        }
    }

    #[test]
    fn merge_combines_declaration_and_definition_across_files() {
        let id = SymbolId::of(b"foo");
        let mut declared = Symbol::new(id, "foo", SymbolKind::Function);
        declared.canonical_declaration = Some(SymbolLocation::new("file:///h.h", 0, 0));
        let mut defined = Symbol::new(id, "foo", SymbolKind::Function);
        defined.definition = Some(SymbolLocation::new("file:///a.cpp", 3, 0));

        let files = vec![
            file_with_symbol(declared, false),
            file_with_symbol(defined, true),
        ];
        let index = MemIndex::build(&files, IndexType::Heavy, DuplicateHandling::Merge);

        let hits = index.lookup("foo");
        assert_eq!(hits.len(), 1);
        assert_eq!(
            hits[0].canonical_declaration.as_ref().unwrap().file_uri,
            "file:///h.h"
        );
        assert_eq!(hits[0].definition.as_ref().unwrap().file_uri, "file:///a.cpp");
    }

    #[test]
    fn heavy_build_counts_refs_only_from_tu_files() {
        let id = SymbolId::of(b"x");
        let symbol = Symbol::new(id, "x", SymbolKind::Data);

        let mut tu_refs = RefSlab::builder();
        tu_refs.insert(
            id,
            Ref {
                location: SymbolLocation::new("file:///a.cpp", 1, 0),
                kind: RefKind::Reference,
            },
        );
        let mut header_refs = RefSlab::builder();
        header_refs.insert(
            id,
            Ref {
                location: SymbolLocation::new("file:///h.h", 1, 0),
                kind: RefKind::Reference,
            },
        );

        let mut tu_file = file_with_symbol(symbol, true);
        tu_file.refs = Some(Arc::new(tu_refs.build()));
        let header_file = FileSlabs {
            symbols: None,
            refs: Some(Arc::new(header_refs.build())),
            relations: None,
            counts_refs: false,
        };

        let files = vec![tu_file, header_file];
        let heavy = MemIndex::build(&files, IndexType::Heavy, DuplicateHandling::Merge);
        assert_eq!(heavy.lookup("x")[0].references, 1);
        assert_eq!(heavy.refs(id).len(), 2);

        let light = MemIndex::build(&files, IndexType::Light, DuplicateHandling::Merge);
        assert_eq!(light.lookup("x")[0].references, 0);
    }

    #[test]
    fn pick_one_keeps_the_first_record_seen() {
        let id = SymbolId::of(b"dup");
        let mut first = Symbol::new(id, "dup", SymbolKind::Data);
        first.references = 7;
        let mut second = Symbol::new(id, "dup", SymbolKind::Data);
        second.definition = Some(SymbolLocation::new("file:///b.cpp", 1, 0));

        let files = vec![
            file_with_symbol(first, false),
            file_with_symbol(second, false),
        ];
        let index = MemIndex::build(&files, IndexType::Light, DuplicateHandling::PickOne);

        let hits = index.lookup("dup");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].references, 7);
        assert!(hits[0].definition.is_none(), "later records are ignored");

        let merged = MemIndex::build(&files, IndexType::Light, DuplicateHandling::Merge);
        assert!(merged.lookup("dup")[0].definition.is_some());
    }

    #[test]
    fn memory_estimate_grows_with_content() {
        let empty = MemIndex::build(&[], IndexType::Light, DuplicateHandling::Merge);
        let populated = MemIndex::build(
            &[file_with_symbol(
                Symbol::new(SymbolId::of(b"x"), "x", SymbolKind::Data),
                true,
            )],
            IndexType::Light,
            DuplicateHandling::Merge,
        );
        assert!(populated.estimate_memory_usage() > empty.estimate_memory_usage());
    }
}
