//! Events delivered to client sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    traits::AgentResponse,
    workspace::{ProgressEntry, Task},
};

/// Result of one command, addressed to the session that sent it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub output: String,
    pub error: String,
    /// Terminal the command was addressed to.
    pub terminal: String,
}

impl CommandResult {
    #[must_use]
    pub fn new(terminal: impl Into<String>, output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: error.into(),
            terminal: terminal.into(),
        }
    }

    /// A result carrying only an error message.
    #[must_use]
    pub fn failure(terminal: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(terminal, String::new(), error)
    }
}

/// Kind of workspace change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceAction {
    FileUploaded,
}

/// A terminal added by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub terminal_id: String,
    pub container_name: String,
    pub port: u16,
    pub address: String,
}

/// Reachability of an agent terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    Running,
    Stopped,
}

/// Event sent from the server to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Greeting sent on connect.
    Status { message: String },
    /// Unicast result of `execute_command`.
    CommandOutput(CommandResult),
    /// A file was added or replaced.
    WorkspaceUpdated {
        action: WorkspaceAction,
        file_name: String,
        file_type: String,
    },
    /// A task was created.
    TaskCreated(Task),
    /// A progress entry was appended to a task.
    TaskProgressUpdated {
        task_id: String,
        progress: ProgressEntry,
    },
    /// A new agent terminal became routable.
    TerminalSpawned(TerminalInfo),
    /// A message was relayed from one terminal to an agent.
    McpMessageReceived {
        source: String,
        target: String,
        message: String,
        response: AgentResponse,
    },
    /// Unicast answer to `get_container_status`.
    ContainerStatus {
        containers: BTreeMap<String, AgentHealth>,
    },
    /// Request-level error (malformed message, etc.).
    Error { message: String },
    Pong,
}
