//! Command line parsing.

use thiserror::Error;

use crate::shell::get_shell_command;

/// Command parse error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandBuildError {
    #[error("Command cannot be parsed: {0}")]
    InvalidSyntax(String),
    #[error("Command is empty after parsing")]
    EmptyCommand,
}

/// How a raw command line is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Chained commands, handed to the platform shell verbatim.
    Shell {
        shell: String,
        flag: &'static str,
        script: String,
    },
    /// A single program invocation, no shell involved.
    Direct { program: String, args: Vec<String> },
}

impl CommandLine {
    /// Parse a raw command line.
    ///
    /// Lines chaining commands with `;`, `&&` or `||` go through the shell;
    /// everything else is split with POSIX shell-word rules and run directly.
    ///
    /// # Errors
    /// Returns error on unbalanced quotes or an empty line.
    pub fn parse(raw: &str) -> Result<Self, CommandBuildError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        if needs_shell(raw) {
            let (shell, flag) = get_shell_command();
            return Ok(Self::Shell {
                shell,
                flag,
                script: raw.to_string(),
            });
        }

        let mut parts = shlex::split(raw).ok_or_else(|| CommandBuildError::InvalidSyntax(raw.to_string()))?;
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        let program = parts.remove(0);
        Ok(Self::Direct { program, args: parts })
    }

    /// Program name for diagnostics.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Shell { shell, .. } => shell,
            Self::Direct { program, .. } => program,
        }
    }
}

/// Whether a line chains commands.
#[must_use]
pub fn needs_shell(raw: &str) -> bool {
    raw.contains(';') || raw.contains("&&") || raw.contains("||")
}
