//! HTTP client for remote agents.
//!
//! Agents expose `POST /execute` taking `{"command": ...}` and answering with
//! an `{output, error}` envelope, plus `GET /health`.

use std::time::Duration;

use agent_terminal_core::{
    target::AgentTarget,
    traits::{AgentError, AgentInvoker, AgentResponse},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest body excerpt quoted in protocol errors.
const SNIPPET_LEN: usize = 200;

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    command: &'a str,
}

/// Raw envelope. A body carrying neither field is not an agent answer.
#[derive(Deserialize)]
struct Envelope {
    output: Option<String>,
    error: Option<String>,
}

/// Agent invoker over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: reqwest::Client,
}

impl HttpAgentClient {
    /// Build a client with the standard connect timeout.
    ///
    /// # Errors
    /// Returns error if the TLS backend cannot be initialized.
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    fn map_send_error(target: &AgentTarget, timeout: Duration, e: &reqwest::Error) -> AgentError {
        if e.is_timeout() {
            AgentError::Timeout {
                terminal: target.name.clone(),
                after: timeout,
            }
        } else if e.is_connect() || e.is_request() {
            AgentError::Unreachable {
                terminal: target.name.clone(),
                address: target.address.clone(),
                message: e.to_string(),
            }
        } else {
            AgentError::Protocol {
                terminal: target.name.clone(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentClient {
    async fn invoke(
        &self,
        target: &AgentTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<AgentResponse, AgentError> {
        tracing::debug!(terminal = %target.name, url = %target.execute_url(), "Invoking agent");

        let resp = self
            .client
            .post(target.execute_url())
            .timeout(timeout)
            .json(&ExecuteRequest { command })
            .send()
            .await
            .map_err(|e| Self::map_send_error(target, timeout, &e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Self::map_send_error(target, timeout, &e))?;

        // Agents report command failures as non-2xx with the same envelope.
        match serde_json::from_str::<Envelope>(&body) {
            Ok(Envelope { output: None, error: None }) => {
                tracing::warn!(terminal = %target.name, %status, "Agent response carries no envelope fields");
                Err(protocol_error(target, status, &body))
            }
            Ok(Envelope { output, error }) => {
                if !status.is_success() {
                    tracing::debug!(terminal = %target.name, %status, "Agent reported failure");
                }
                Ok(AgentResponse {
                    output: output.unwrap_or_default(),
                    error: error.unwrap_or_default(),
                })
            }
            Err(e) => {
                tracing::warn!(terminal = %target.name, %status, "Agent sent malformed response: {e}");
                Err(protocol_error(target, status, &body))
            }
        }
    }

    async fn health(&self, target: &AgentTarget) -> bool {
        match self
            .client
            .get(target.health_url())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(terminal = %target.name, "Health probe failed: {e}");
                false
            }
        }
    }
}

fn protocol_error(target: &AgentTarget, status: reqwest::StatusCode, body: &str) -> AgentError {
    let snippet: String = body.chars().take(SNIPPET_LEN).collect();
    AgentError::Protocol {
        terminal: target.name.clone(),
        message: format!("HTTP {status}: {snippet}"),
    }
}
