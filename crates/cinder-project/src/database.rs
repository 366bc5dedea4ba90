use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;

use crate::compile_command::{split_command_line, CompileCommand};

pub const COMPILE_COMMANDS_FILENAME: &str = "compile_commands.json";

/// Project-level facts attached to a compile command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Root of the project's source tree; shard storage is keyed by it.
    pub source_root: PathBuf,
}

/// A batch of files whose compile commands changed.
pub type ChangedFiles = Vec<PathBuf>;

/// Source of compile commands plus a change stream.
///
/// `watch` hands out an event-stream receiver; dropping the receiver ends the
/// subscription.
pub trait CompilationDatabase: Send + Sync {
    /// The command and project for `path`, if the database knows the file.
    fn compile_command(&self, path: &Path) -> Option<(CompileCommand, ProjectInfo)>;

    /// Subscribe to change notifications.
    fn watch(&self) -> Receiver<ChangedFiles>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse compilation database {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// On-disk entry shape of `compile_commands.json`.
///
/// Exactly one of `command` / `arguments` is expected per entry; `arguments`
/// wins when both are present.
#[derive(Debug, Deserialize)]
struct RawEntry {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// A `compile_commands.json`-backed compilation database.
///
/// Commands are loaded eagerly and keyed by the absolute main-file path.
/// `notify_changed` fans a change batch out to every live watcher.
pub struct JsonCompilationDatabase {
    source_root: PathBuf,
    commands: HashMap<PathBuf, CompileCommand>,
    watchers: Mutex<Vec<Sender<ChangedFiles>>>,
}

impl JsonCompilationDatabase {
    /// Loads `<source_root>/compile_commands.json`.
    pub fn load(source_root: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let source_root = source_root.into();
        let path = source_root.join(COMPILE_COMMANDS_FILENAME);
        let bytes = std::fs::read(&path)?;
        let entries: Vec<RawEntry> =
            serde_json::from_slice(&bytes).map_err(|err| ProjectError::Parse {
                path: path.clone(),
                message: err.to_string(),
            })?;

        let commands = entries
            .into_iter()
            .filter_map(|entry| {
                let command_line = match (entry.arguments, entry.command) {
                    (Some(arguments), _) => arguments,
                    (None, Some(command)) => split_command_line(&command),
                    (None, None) => {
                        tracing::warn!(
                            target = "cinder.project",
                            file = %entry.file.display(),
                            "compilation database entry has neither command nor arguments"
                        );
                        return None;
                    }
                };
                let command = CompileCommand {
                    directory: entry.directory,
                    filename: entry.file,
                    command_line,
                };
                Some((command.absolute_main_path(), command))
            })
            .collect();

        Ok(Self {
            source_root,
            commands,
            watchers: Mutex::new(Vec::new()),
        })
    }

    /// Builds a database directly from commands, without touching disk.
    pub fn from_commands(source_root: impl Into<PathBuf>, commands: Vec<CompileCommand>) -> Self {
        Self {
            source_root: source_root.into(),
            commands: commands
                .into_iter()
                .map(|command| (command.absolute_main_path(), command))
                .collect(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// All main-file paths known to the database.
    pub fn all_files(&self) -> Vec<PathBuf> {
        self.commands.keys().cloned().collect()
    }

    /// Delivers a change batch to every live watcher, pruning dead ones.
    pub fn notify_changed(&self, files: ChangedFiles) {
        let mut watchers = self.watchers.lock().expect("watcher list mutex poisoned");
        watchers.retain(|sender| sender.send(files.clone()).is_ok());
    }
}

impl CompilationDatabase for JsonCompilationDatabase {
    fn compile_command(&self, path: &Path) -> Option<(CompileCommand, ProjectInfo)> {
        let command = self.commands.get(path)?.clone();
        Some((
            command,
            ProjectInfo {
                source_root: self.source_root.clone(),
            },
        ))
    }

    fn watch(&self) -> Receiver<ChangedFiles> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.watchers
            .lock()
            .expect("watcher list mutex poisoned")
            .push(sender);
        receiver
    }
}
