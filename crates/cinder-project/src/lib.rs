//! Compile commands and the compilation-database boundary.
//!
//! The background indexer consumes compile commands from a
//! [`CompilationDatabase`] and subscribes to its change stream. Changes are
//! delivered over a `crossbeam_channel` receiver so consumers can integrate
//! the stream into their own loops without a particular async runtime.

mod compile_command;
mod database;

pub use compile_command::CompileCommand;
pub use database::{
    ChangedFiles, CompilationDatabase, JsonCompilationDatabase, ProjectError, ProjectInfo,
    COMPILE_COMMANDS_FILENAME,
};
