//! The boundary to the external front-end that actually parses code.
//!
//! The indexer never looks inside source files itself; it hands a compile
//! command and a filesystem to a [`TuParser`] and receives slabs plus the
//! translation unit's include graph back.

use std::path::{Path, PathBuf};

use cinder_core::FileDigest;
use cinder_project::CompileCommand;
use cinder_symbols::{IncludeGraph, RefSlab, RelationSlab, SymbolSlab};
use cinder_vfs::FileSystem;

/// Per-file skip decision, evaluated by the parser for every file it visits.
///
/// Returns `false` for files whose records should not be collected (the
/// stored shard is already up to date). Skipped files still contribute their
/// include-graph node.
pub type FileFilter<'a> = dyn Fn(&Path, FileDigest) -> bool + 'a;

/// Everything a parser invocation needs.
pub struct ParseInputs<'a> {
    pub command: &'a CompileCommand,
    pub fs: &'a dyn FileSystem,
    pub file_filter: &'a FileFilter<'a>,
}

/// The output of parsing one translation unit.
///
/// `had_errors` reports uncompilable errors; it is not a parse failure. The
/// slabs may be partial in that case, which is exactly why the flag forces
/// re-indexing later.
pub struct ParsedTu {
    pub symbols: SymbolSlab,
    pub refs: RefSlab,
    pub relations: RelationSlab,
    pub sources: IncludeGraph,
    pub had_errors: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The front-end could not be constructed for this command.
    #[error("failed to set up parser for {file}: {message}")]
    Setup { file: PathBuf, message: String },

    /// The front-end started but did not run to completion.
    #[error("parser execution failed for {file}: {message}")]
    Execution { file: PathBuf, message: String },
}

/// Turns a compile command into index records.
pub trait TuParser: Send + Sync {
    fn parse(&self, inputs: ParseInputs<'_>) -> Result<ParsedTu, ParseError>;
}
