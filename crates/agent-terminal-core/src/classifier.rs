//! Command classification.
//!
//! Decides, without I/O, whether a command runs locally, goes to a remote
//! agent, or is rejected before anything is executed.

use std::fmt;

use crate::target::{AgentTarget, TargetSet, is_system_terminal};

/// Dispatch decision for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run in a local process.
    Local,
    /// Send to a remote agent.
    Remote(AgentTarget),
    /// Do not execute.
    Reject(Rejection),
}

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A shell utility addressed to an agent terminal.
    SystemCommand { terminal: String, token: String },
    /// The terminal is not registered.
    InvalidTarget(String),
}

impl Rejection {
    /// Short machine-oriented reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::SystemCommand { .. } => "looks like a system command; use the system terminal",
            Self::InvalidTarget(_) => "invalid target",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemCommand { terminal, token } => write!(
                f,
                "This looks like a system command. Please use the System Terminal for commands like \"{token}\".\n\
                 The {terminal} terminal is for AI assistance only."
            ),
            Self::InvalidTarget(terminal) => write!(
                f,
                "Invalid target terminal \"{terminal}\". Use the System Terminal or a running agent terminal."
            ),
        }
    }
}

/// Classifies commands against a deny-list of shell utilities.
#[derive(Debug, Clone)]
pub struct Classifier {
    deny_list: Vec<String>,
}

impl Classifier {
    /// Create a classifier with the given deny-list.
    #[must_use]
    pub fn new<I>(deny_list: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            deny_list: deny_list
                .into_iter()
                .map(|d| d.into().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Decide where `command` addressed to `terminal` should go.
    ///
    /// Emptiness is the caller's concern; an empty command to an agent is
    /// simply forwarded.
    #[must_use]
    pub fn classify(&self, command: &str, terminal: &str, targets: &TargetSet) -> Decision {
        if is_system_terminal(terminal) {
            return Decision::Local;
        }
        let Some(agent) = targets.get(terminal) else {
            return Decision::Reject(Rejection::InvalidTarget(terminal.to_string()));
        };

        let lowered = command.trim_start().to_lowercase();
        if agent.matches_prefix(&lowered) {
            return Decision::Remote(agent.clone());
        }
        if let Some(token) = self.denied_token(&lowered) {
            return Decision::Reject(Rejection::SystemCommand {
                terminal: agent.name.clone(),
                token: token.to_string(),
            });
        }
        Decision::Remote(agent.clone())
    }

    fn denied_token<'a>(&self, lowered: &'a str) -> Option<&'a str> {
        tokens(lowered).find(|token| self.deny_list.iter().any(|d| d == token))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DENY_LIST.iter().copied())
    }
}

/// Split on whitespace and shell punctuation, reducing paths to their basename.
fn tokens(command: &str) -> impl Iterator<Item = &str> {
    command
        .split(|c: char| {
            c.is_whitespace()
                || matches!(c, ';' | '&' | '|' | '(' | ')' | '<' | '>' | '`' | '$' | '"' | '\'')
        })
        .map(|t| t.rsplit('/').next().unwrap_or(t))
        .filter(|t| !t.is_empty())
}
