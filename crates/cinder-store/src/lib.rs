//! Content digests and persistent per-file index shards.
//!
//! A shard is the per-source-file slice of the index: the symbols declared in
//! the file, the references located in it, the relations whose subject lives
//! in it, and a single include-graph node. Shards are written atomically and
//! read defensively: a torn, truncated or version-skewed shard loads as
//! absent, never as an error.

mod digest;
mod error;
mod shard;
mod storage;
mod util;

pub use digest::{digest_bytes, digest_file};
pub use error::StoreError;
pub use shard::{decode_shard, encode_shard, Shard, SHARD_SCHEMA_VERSION};
pub use storage::{
    disk_storage_factory, DiskShardStorage, ShardStorage, ShardStorageFactory, SHARD_DIR_NAME,
};
pub use util::{atomic_write, SHARD_PAYLOAD_LIMIT_BYTES};
