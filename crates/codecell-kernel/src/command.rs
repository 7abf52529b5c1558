//! Interpreter command building.

use std::path::PathBuf;

use thiserror::Error;

use crate::{DRIVER_SOURCE, resolve::resolve_executable_path};

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Interpreter command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Interpreter command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    NotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(CommandBuildError::NotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for the interpreter command that hosts the kernel driver.
#[derive(Debug, Clone)]
pub struct InterpreterCommand {
    /// Interpreter command line, e.g. `python3` or `uv run python`.
    pub base: String,
    /// Extra interpreter flags placed before the driver.
    pub flags: Vec<String>,
}

impl InterpreterCommand {
    /// Create a builder for the given interpreter command line.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            flags: vec!["-u".to_string()],
        }
    }

    /// Build `<interpreter> <flags> -c <driver>`.
    ///
    /// # Errors
    /// Returns error if the interpreter command is invalid.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = split_command_line(&self.base)?;
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        parts.extend(self.flags.iter().cloned());
        parts.push("-c".to_string());
        parts.push(DRIVER_SOURCE.to_string());

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

fn split_command_line(input: &str) -> Result<Vec<String>, CommandBuildError> {
    #[cfg(windows)]
    {
        let parts = winsplit::split(input);
        if parts.is_empty() {
            Err(CommandBuildError::EmptyCommand)
        } else {
            Ok(parts)
        }
    }

    #[cfg(not(windows))]
    {
        shlex::split(input).ok_or_else(|| CommandBuildError::InvalidBase(input.to_string()))
    }
}
