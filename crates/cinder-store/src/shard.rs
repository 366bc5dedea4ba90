use cinder_core::CINDER_VERSION;
use cinder_project::CompileCommand;
use cinder_symbols::{IncludeGraph, RefSlab, RelationSlab, SymbolSlab};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::util::{from_bytes, to_bytes};

pub const SHARD_SCHEMA_VERSION: u32 = 1;

/// The per-source-file slice of the index, as persisted.
///
/// `command` is present only on the shard of a translation unit's main file;
/// header shards carry no compile command. `sources` holds the node for this
/// shard's own file plus skeletal entries for its direct includes, which is
/// enough to walk dependencies without loading their payloads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Shard {
    pub symbols: Option<SymbolSlab>,
    pub refs: Option<RefSlab>,
    pub relations: Option<RelationSlab>,
    pub sources: Option<IncludeGraph>,
    pub command: Option<CompileCommand>,
}

#[derive(Serialize, Deserialize)]
struct PersistedShard {
    schema_version: u32,
    cinder_version: String,
    shard: Shard,
}

/// Encodes a shard into its persisted byte form.
///
/// Encoding is deterministic: the same shard always produces the same bytes.
pub fn encode_shard(shard: &Shard) -> Result<Vec<u8>, StoreError> {
    to_bytes(&PersistedShard {
        schema_version: SHARD_SCHEMA_VERSION,
        cinder_version: CINDER_VERSION.to_string(),
        shard: shard.clone(),
    })
}

/// Decodes persisted bytes back into a shard.
///
/// Returns `None` for anything unusable: truncated or corrupt payloads and
/// shards written by a different schema or Cinder version.
pub fn decode_shard(bytes: &[u8]) -> Option<Shard> {
    let persisted: PersistedShard = from_bytes(bytes).ok()?;
    if persisted.schema_version != SHARD_SCHEMA_VERSION {
        return None;
    }
    if persisted.cinder_version != CINDER_VERSION {
        return None;
    }
    Some(persisted.shard)
}

#[cfg(test)]
mod tests {
    use super::*;

    use cinder_core::SymbolId;
    use cinder_symbols::{IncludeGraphNode, SourceFlags, Symbol, SymbolKind};

    fn sample_shard() -> Shard {
        let mut symbols = SymbolSlab::builder();
        symbols.insert(Symbol::new(SymbolId::of(b"x"), "x", SymbolKind::Data));

        let mut sources = IncludeGraph::new();
        sources.insert(IncludeGraphNode {
            uri: "file:///a.cpp".to_string(),
            digest: crate::digest_bytes(b"int x;"),
            direct_includes: vec!["file:///h.h".to_string()],
            flags: SourceFlags::IS_TU,
        });

        Shard {
            symbols: Some(symbols.build()),
            refs: None,
            relations: None,
            sources: Some(sources),
            command: None,
        }
    }

    #[test]
    fn round_trip_is_bytewise_deterministic() {
        let shard = sample_shard();
        let first = encode_shard(&shard).unwrap();
        let second = encode_shard(&shard).unwrap();
        assert_eq!(first, second);
        assert_eq!(decode_shard(&first).unwrap(), shard);
    }

    #[test]
    fn corrupt_bytes_decode_as_absent() {
        let mut bytes = encode_shard(&sample_shard()).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(decode_shard(&bytes).is_none());
        assert!(decode_shard(b"garbage").is_none());
    }

    #[test]
    fn version_skew_decodes_as_absent() {
        let persisted = PersistedShard {
            schema_version: SHARD_SCHEMA_VERSION + 1,
            cinder_version: CINDER_VERSION.to_string(),
            shard: sample_shard(),
        };
        let bytes = to_bytes(&persisted).unwrap();
        assert!(decode_shard(&bytes).is_none());
    }
}
