//! Traits for the collaborators the router and lifecycle manager call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::target::AgentTarget;

/// Captured output of a local process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Local execution error.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Command timed out after {} seconds", .0.as_secs_f64())]
    TimeoutExceeded(Duration),
    #[error("Command not found: {0}")]
    CommandNotFound(String),
    #[error("System command error: {0}")]
    Execution(String),
}

/// Runs commands on the local host.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `command`, killing it after `timeout`.
    async fn run(&self, command: &str, timeout: Duration) -> Result<ExecOutput, ExecError>;
}

/// Response envelope returned by an agent. Both fields are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub output: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub error: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Remote agent call error.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent {terminal} unreachable at {address}: {message}")]
    Unreachable {
        terminal: String,
        address: String,
        message: String,
    },
    #[error("Agent {terminal} did not answer within {} seconds", after.as_secs_f64())]
    Timeout { terminal: String, after: Duration },
    #[error("Agent {terminal} sent an invalid response: {message}")]
    Protocol { terminal: String, message: String },
}

/// Calls remote agents.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Send `command` to the agent's execute endpoint.
    async fn invoke(
        &self,
        target: &AgentTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<AgentResponse, AgentError>;

    /// Probe the agent's health endpoint.
    async fn health(&self, target: &AgentTarget) -> bool;
}

/// Workspace store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store error: {0}")]
    Internal(String),
}

/// External key-value service backing the workspace.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Container launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    /// `(host, container)` port pairs.
    pub ports: Vec<(u16, u16)>,
    pub env: Vec<(String, String)>,
    pub network: Option<String>,
}

/// A published port of a running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

/// A running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub name: String,
    pub ports: Vec<PortMapping>,
}

/// Container runtime error.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("Container command failed: {0}")]
    CommandFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Launches and inspects agent containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container. Returns its id.
    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Run a command inside a container. Returns its stdout.
    async fn exec(&self, name: &str, command: &[String]) -> Result<String, RuntimeError>;

    /// Running containers whose name contains `name_filter`.
    async fn list(&self, name_filter: &str) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Whether the agent inside `name` answers on `port`.
    async fn healthcheck(&self, name: &str, port: u16) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_response_fills_missing_and_null_fields() {
        let r: AgentResponse = serde_json::from_str(r#"{"output":"hi"}"#).unwrap();
        assert_eq!(r, AgentResponse { output: "hi".into(), error: String::new() });

        let r: AgentResponse =
            serde_json::from_str(r#"{"output":null,"error":"boom","exitCode":1}"#).unwrap();
        assert_eq!(r.output, "");
        assert_eq!(r.error, "boom");
    }

    #[test]
    fn exec_error_messages() {
        assert_eq!(
            ExecError::TimeoutExceeded(Duration::from_secs(30)).to_string(),
            "Command timed out after 30 seconds"
        );
        assert_eq!(
            ExecError::TimeoutExceeded(Duration::from_millis(200)).to_string(),
            "Command timed out after 0.2 seconds"
        );
        assert_eq!(
            AgentError::Timeout {
                terminal: "gemini-1".into(),
                after: Duration::from_millis(1500),
            }
            .to_string(),
            "Agent gemini-1 did not answer within 1.5 seconds"
        );
        assert_eq!(
            ExecError::CommandNotFound("nope".into()).to_string(),
            "Command not found: nope"
        );
    }
}
