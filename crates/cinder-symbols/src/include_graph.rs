//! The include graph describing which files a translation unit pulled in.
//!
//! The graph is keyed by file URI and self-contained: every URI referenced
//! from a node's `direct_includes` is also a key, possibly mapping to a
//! skeletal node that carries nothing but its own URI. Cycles, self-loops and
//! duplicate edges are all legal; consumers must walk with a visited set.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};

use cinder_core::FileDigest;
use serde::{Deserialize, Serialize};

/// Per-node bit flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceFlags(u8);

impl SourceFlags {
    pub const NONE: SourceFlags = SourceFlags(0);
    /// The file was the main file of a translation unit.
    pub const IS_TU: SourceFlags = SourceFlags(1 << 0);
    /// The last indexing pass over this file saw uncompilable errors.
    pub const HAD_ERRORS: SourceFlags = SourceFlags(1 << 1);

    pub fn contains(self, other: SourceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SourceFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for SourceFlags {
    type Output = SourceFlags;

    fn bitor(self, rhs: SourceFlags) -> SourceFlags {
        SourceFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SourceFlags {
    fn bitor_assign(&mut self, rhs: SourceFlags) {
        self.0 |= rhs.0;
    }
}

/// One file in an include graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeGraphNode {
    pub uri: String,
    pub digest: FileDigest,
    pub direct_includes: Vec<String>,
    pub flags: SourceFlags,
}

impl IncludeGraphNode {
    /// A node that exists only because another node's edge points at it.
    pub fn skeletal(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }
}

/// Map from file URI to its include-graph node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncludeGraph {
    nodes: BTreeMap<String, IncludeGraphNode>,
}

impl IncludeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node under its own URI, creating skeletal entries for every
    /// direct include so the graph stays self-contained.
    ///
    /// Inserting over an existing skeletal node replaces it; inserting a
    /// skeletal node over a populated one is a no-op for the payload.
    pub fn insert(&mut self, node: IncludeGraphNode) {
        for include in &node.direct_includes {
            self.nodes
                .entry(include.clone())
                .or_insert_with(|| IncludeGraphNode::skeletal(include.clone()));
        }
        use std::collections::btree_map::Entry;
        match self.nodes.entry(node.uri.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(node);
            }
            Entry::Occupied(mut slot) => {
                let is_skeletal = node.digest.is_zero()
                    && node.direct_includes.is_empty()
                    && node.flags == SourceFlags::NONE;
                if !is_skeletal {
                    slot.insert(node);
                }
            }
        }
    }

    pub fn get(&self, uri: &str) -> Option<&IncludeGraphNode> {
        self.nodes.get(uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IncludeGraphNode)> {
        self.nodes.iter()
    }

    pub fn uris(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// ORs `flags` into every node.
    pub fn mark_all(&mut self, flags: SourceFlags) {
        for node in self.nodes.values_mut() {
            node.flags |= flags;
        }
    }

    /// Extracts the single-node graph persisted inside a shard: the payload
    /// for `uri` plus skeletal entries for each of its direct includes.
    pub fn sub_graph(&self, uri: &str) -> IncludeGraph {
        let mut node = self
            .nodes
            .get(uri)
            .cloned()
            .unwrap_or_else(|| IncludeGraphNode::skeletal(uri));
        node.uri = uri.to_string();

        let mut out = IncludeGraph::new();
        out.insert(node);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(uri: &str, includes: &[&str]) -> IncludeGraphNode {
        IncludeGraphNode {
            uri: uri.to_string(),
            digest: FileDigest::from_bytes([7; cinder_core::FILE_DIGEST_LEN]),
            direct_includes: includes.iter().map(|s| s.to_string()).collect(),
            flags: SourceFlags::NONE,
        }
    }

    #[test]
    fn insert_keeps_the_graph_self_contained() {
        let mut graph = IncludeGraph::new();
        graph.insert(node("file:///a.cpp", &["file:///h.h", "file:///g.h"]));

        assert_eq!(graph.len(), 3);
        assert!(graph.get("file:///h.h").unwrap().digest.is_zero());
    }

    #[test]
    fn skeletal_insert_does_not_clobber_payload() {
        let mut graph = IncludeGraph::new();
        graph.insert(node("file:///h.h", &[]));
        graph.insert(node("file:///a.cpp", &["file:///h.h"]));

        assert!(!graph.get("file:///h.h").unwrap().digest.is_zero());
    }

    #[test]
    fn sub_graph_keeps_only_the_requested_payload() {
        let mut graph = IncludeGraph::new();
        graph.insert(node("file:///a.cpp", &["file:///h.h"]));
        graph.insert(node("file:///h.h", &["file:///g.h"]));

        let sub = graph.sub_graph("file:///h.h");
        assert_eq!(sub.len(), 2);
        assert!(!sub.get("file:///h.h").unwrap().digest.is_zero());
        assert!(sub.get("file:///g.h").unwrap().digest.is_zero());
        assert!(sub.get("file:///a.cpp").is_none());
    }

    #[test]
    fn self_loops_are_representable() {
        let mut graph = IncludeGraph::new();
        graph.insert(node("file:///recursive.h", &["file:///recursive.h"]));

        let sub = graph.sub_graph("file:///recursive.h");
        assert_eq!(sub.len(), 1);
        assert_eq!(
            sub.get("file:///recursive.h").unwrap().direct_includes,
            vec!["file:///recursive.h".to_string()]
        );
    }

    #[test]
    fn flags_compose() {
        let mut flags = SourceFlags::IS_TU;
        flags |= SourceFlags::HAD_ERRORS;
        assert!(flags.contains(SourceFlags::IS_TU));
        assert!(flags.contains(SourceFlags::HAD_ERRORS));
        assert!(!SourceFlags::NONE.contains(SourceFlags::IS_TU));
    }
}
