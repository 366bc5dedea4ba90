//! Test support: a deterministic fixture parser and an in-memory shard store.
//!
//! The real front-end is an external collaborator, so tests drive the
//! indexer with a tiny line-oriented language instead:
//!
//! - `#include "path"` pulls in another file (relative to the including
//!   file, or absolute),
//! - `int NAME;` declares and defines a data symbol,
//! - `void NAME();` declares a function, `void NAME() {}` defines it,
//! - `use NAME;` references a symbol,
//! - `inherits DERIVED BASE;` records a base-of relation,
//! - `#error` marks the translation unit as having uncompilable errors.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cinder_core::path::{path_to_file_uri, remove_dot_segments};
use cinder_core::SymbolId;
use cinder_store::{
    decode_shard, digest_bytes, encode_shard, Shard, ShardStorage, ShardStorageFactory, StoreError,
};
use cinder_symbols::{
    IncludeGraph, IncludeGraphNode, Ref, RefKind, RefSlab, Relation, RelationKind, RelationSlab,
    SourceFlags, Symbol, SymbolKind, SymbolLocation, SymbolSlab,
};

use crate::parser::{ParseError, ParseInputs, ParsedTu, TuParser};

/// Parses the fixture language described in the module docs.
pub struct FixtureParser;

enum Directive<'a> {
    Include(&'a str),
    DeclData(&'a str),
    DeclFn(&'a str),
    DefFn(&'a str),
    Use(&'a str),
    Inherits { derived: &'a str, base: &'a str },
    Error,
}

fn parse_line(line: &str) -> Option<Directive<'_>> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("#include \"") {
        return rest.strip_suffix('"').map(Directive::Include);
    }
    if line.starts_with("#error") {
        return Some(Directive::Error);
    }
    if let Some(rest) = line.strip_prefix("int ") {
        return rest.strip_suffix(';').map(str::trim).map(Directive::DeclData);
    }
    if let Some(rest) = line.strip_prefix("void ") {
        if let Some(name) = rest.strip_suffix("();") {
            return Some(Directive::DeclFn(name.trim()));
        }
        if let Some(name) = rest.strip_suffix("() {}") {
            return Some(Directive::DefFn(name.trim()));
        }
        return None;
    }
    if let Some(rest) = line.strip_prefix("use ") {
        return rest.strip_suffix(';').map(str::trim).map(Directive::Use);
    }
    if let Some(rest) = line.strip_prefix("inherits ") {
        let rest = rest.strip_suffix(';')?;
        let mut parts = rest.split_whitespace();
        let derived = parts.next()?;
        let base = parts.next()?;
        return Some(Directive::Inherits { derived, base });
    }
    None
}

#[derive(Default)]
struct SymbolFacts {
    kind: Option<SymbolKind>,
    declaration: Option<SymbolLocation>,
    definition: Option<SymbolLocation>,
}

impl TuParser for FixtureParser {
    fn parse(&self, inputs: ParseInputs<'_>) -> Result<ParsedTu, ParseError> {
        let main_path = inputs.command.absolute_main_path();

        // Walk the include closure breadth-first. The include graph covers
        // every reachable file; the file filter only gates record
        // collection.
        let mut contents: BTreeMap<PathBuf, String> = BTreeMap::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut to_visit: VecDeque<PathBuf> = VecDeque::new();
        visited.insert(main_path.clone());
        to_visit.push_back(main_path.clone());

        let mut sources = IncludeGraph::new();
        let mut had_errors = false;

        while let Some(path) = to_visit.pop_front() {
            let bytes = match inputs.fs.read_bytes(&path) {
                Ok(bytes) => bytes,
                Err(err) if path == main_path => {
                    return Err(ParseError::Execution {
                        file: main_path,
                        message: err.to_string(),
                    });
                }
                // Missing headers leave no node behind; we cannot know what
                // their contents should have been.
                Err(_) => continue,
            };
            let text = String::from_utf8_lossy(&bytes).into_owned();

            let mut direct_includes = Vec::new();
            for line in text.lines() {
                match parse_line(line) {
                    Some(Directive::Include(target)) => {
                        let target_path = if Path::new(target).is_absolute() {
                            PathBuf::from(target)
                        } else {
                            let dir = path.parent().unwrap_or_else(|| Path::new("/"));
                            remove_dot_segments(&dir.join(target))
                        };
                        if !inputs.fs.exists(&target_path) {
                            continue;
                        }
                        direct_includes.push(path_to_file_uri(&target_path));
                        if visited.insert(target_path.clone()) {
                            to_visit.push_back(target_path);
                        }
                    }
                    Some(Directive::Error) => had_errors = true,
                    _ => {}
                }
            }

            let mut flags = SourceFlags::NONE;
            if path == main_path {
                flags.insert(SourceFlags::IS_TU);
            }
            sources.insert(IncludeGraphNode {
                uri: path_to_file_uri(&path),
                digest: digest_bytes(&bytes),
                direct_includes,
                flags,
            });
            contents.insert(path, text);
        }

        // Collect records from files the filter wants indexed.
        let mut facts: BTreeMap<String, SymbolFacts> = BTreeMap::new();
        let mut refs = RefSlab::builder();
        let mut relations = RelationSlab::builder();

        for (path, text) in &contents {
            let digest = digest_bytes(text.as_bytes());
            if !(inputs.file_filter)(path, digest) {
                continue;
            }
            let uri = path_to_file_uri(path);
            for (line_index, line) in text.lines().enumerate() {
                let location = SymbolLocation::new(uri.clone(), line_index as u32, 0);
                match parse_line(line) {
                    Some(Directive::DeclData(name)) => {
                        let entry = facts.entry(name.to_string()).or_default();
                        entry.kind = Some(SymbolKind::Data);
                        entry.declaration.get_or_insert(location.clone());
                        entry.definition.get_or_insert(location);
                    }
                    Some(Directive::DeclFn(name)) => {
                        let entry = facts.entry(name.to_string()).or_default();
                        entry.kind.get_or_insert(SymbolKind::Function);
                        entry.declaration.get_or_insert(location);
                    }
                    Some(Directive::DefFn(name)) => {
                        let entry = facts.entry(name.to_string()).or_default();
                        entry.kind = Some(SymbolKind::Function);
                        entry.definition.get_or_insert(location);
                    }
                    Some(Directive::Use(name)) => {
                        refs.insert(
                            SymbolId::of(name.as_bytes()),
                            Ref {
                                location,
                                kind: RefKind::Reference,
                            },
                        );
                    }
                    Some(Directive::Inherits { derived, base }) => {
                        relations.insert(Relation {
                            subject: SymbolId::of(base.as_bytes()),
                            predicate: RelationKind::BaseOf,
                            object: SymbolId::of(derived.as_bytes()),
                        });
                    }
                    Some(Directive::Include(_)) | Some(Directive::Error) | None => {}
                }
            }
        }

        let mut symbols = SymbolSlab::builder();
        for (name, fact) in facts {
            let mut symbol = Symbol::new(
                SymbolId::of(name.as_bytes()),
                name,
                fact.kind.unwrap_or(SymbolKind::Unknown),
            );
            symbol.canonical_declaration = fact.declaration.or_else(|| fact.definition.clone());
            symbol.definition = fact.definition;
            symbols.insert(symbol);
        }

        Ok(ParsedTu {
            symbols: symbols.build(),
            refs: refs.build(),
            relations: relations.build(),
            sources,
            had_errors,
        })
    }
}

/// Shard storage backed by a map, instrumented for assertions.
#[derive(Default)]
pub struct MemoryShardStorage {
    shards: Mutex<HashMap<PathBuf, Vec<u8>>>,
    store_counts: Mutex<HashMap<PathBuf, usize>>,
}

impl MemoryShardStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that hands every source root the same storage instance.
    pub fn factory(storage: &Arc<MemoryShardStorage>) -> ShardStorageFactory {
        let storage = Arc::clone(storage);
        Arc::new(move |_source_root: &Path| Arc::clone(&storage) as Arc<dyn ShardStorage>)
    }

    /// How many times a shard was written for `source_path`.
    pub fn store_count(&self, source_path: &Path) -> usize {
        self.store_counts
            .lock()
            .expect("store counts mutex poisoned")
            .get(source_path)
            .copied()
            .unwrap_or(0)
    }

    /// The raw persisted bytes for `source_path`, if any.
    pub fn shard_bytes(&self, source_path: &Path) -> Option<Vec<u8>> {
        self.shards
            .lock()
            .expect("shards mutex poisoned")
            .get(source_path)
            .cloned()
    }

    /// Paths with a stored shard, sorted.
    pub fn stored_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .shards
            .lock()
            .expect("shards mutex poisoned")
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Overwrites a stored shard with garbage, simulating a torn write.
    pub fn corrupt(&self, source_path: &Path) {
        self.shards
            .lock()
            .expect("shards mutex poisoned")
            .insert(source_path.to_path_buf(), b"torn shard".to_vec());
    }
}

impl ShardStorage for MemoryShardStorage {
    fn load_shard(&self, source_path: &Path) -> Option<Shard> {
        let bytes = self
            .shards
            .lock()
            .expect("shards mutex poisoned")
            .get(source_path)
            .cloned()?;
        decode_shard(&bytes)
    }

    fn store_shard(&self, source_path: &Path, shard: &Shard) -> Result<(), StoreError> {
        let bytes = encode_shard(shard)?;
        self.shards
            .lock()
            .expect("shards mutex poisoned")
            .insert(source_path.to_path_buf(), bytes);
        *self
            .store_counts
            .lock()
            .expect("store counts mutex poisoned")
            .entry(source_path.to_path_buf())
            .or_insert(0) += 1;
        Ok(())
    }
}
