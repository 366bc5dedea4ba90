use std::path::PathBuf;

use cinder_core::path::absolute_main_path;
use serde::{Deserialize, Serialize};

/// One compiler invocation for one translation unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    /// Working directory of the invocation. `filename` may be relative to it.
    pub directory: PathBuf,
    /// The main file of the translation unit.
    pub filename: PathBuf,
    /// Full argument vector, compiler executable included.
    pub command_line: Vec<String>,
}

impl CompileCommand {
    /// Resolves `filename` to an absolute, dot-free path.
    pub fn absolute_main_path(&self) -> PathBuf {
        absolute_main_path(&self.directory, &self.filename)
    }
}

/// Splits a shell command string into arguments.
///
/// Handles double/single quotes and backslash escapes; compile command
/// strings emitted by build systems don't use anything more exotic.
pub(crate) fn split_command_line(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            '"' | '\'' => {
                in_arg = true;
                let quote = ch;
                while let Some(inner) = chars.next() {
                    if inner == quote {
                        break;
                    }
                    if quote == '"' && inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else {
                        current.push(inner);
                    }
                }
            }
            '\\' => {
                in_arg = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            other => {
                in_arg = true;
                current.push(other);
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}
