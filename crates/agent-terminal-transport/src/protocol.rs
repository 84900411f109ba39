//! Wire protocol for client-server communication.
//!
//! JSON text frames tagged by `type`. Outbound frames are
//! `agent_terminal_core::ServerEvent`.

use agent_terminal_core::target::SYSTEM_TERMINAL;
use serde::{Deserialize, Serialize};

pub use agent_terminal_core::ServerEvent as ServerMessage;

/// Greeting sent to every new session.
pub const GREETING: &str = "Connected to AI Agent Platform";

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Run a command on a terminal. The terminal defaults to the system
    /// terminal.
    ExecuteCommand {
        #[serde(default)]
        command: String,
        #[serde(default = "default_terminal")]
        terminal: String,
    },
    /// Ask for the health of every agent terminal.
    GetContainerStatus,
    /// Ping for keepalive.
    Ping,
}

fn default_terminal() -> String {
    SYSTEM_TERMINAL.to_string()
}

/// The connect greeting.
#[must_use]
pub fn greeting() -> ServerMessage {
    ServerMessage::Status {
        message: GREETING.to_string(),
    }
}
