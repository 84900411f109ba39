//! Terminal router.
//!
//! Every command event runs `Received -> Classified -> Dispatching` and ends
//! `Completed`, `Rejected` or `Failed`. Failures never escape as errors: they
//! become a `CommandResult` for the session that sent the command.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use agent_terminal_core::{
    BroadcastHub, Classifier, CommandResult, Decision, ServerEvent, SessionId, TargetRegistry,
    event::AgentHealth,
    target::{AgentClass, AgentTarget, TerminalTarget},
    traits::{AgentError, AgentInvoker, AgentResponse, ExecError, Executor},
};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Error text for empty commands.
pub const NO_COMMAND: &str = "No command provided";

const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

/// A command sent by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub session: SessionId,
    pub command: String,
    pub terminal: String,
}

/// Terminal state of a routed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Rejected,
    Failed,
}

/// Outcome plus the result delivered to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub outcome: Outcome,
    pub result: CommandResult,
}

impl Routed {
    fn completed(terminal: &str, output: String, error: String) -> Self {
        Self {
            outcome: Outcome::Completed,
            result: CommandResult::new(terminal, output, error),
        }
    }

    fn rejected(terminal: &str, error: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Rejected,
            result: CommandResult::failure(terminal, error),
        }
    }

    fn failed(terminal: &str, error: String) -> Self {
        Self {
            outcome: Outcome::Failed,
            result: CommandResult::failure(terminal, error),
        }
    }
}

/// Cross-terminal relay error.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing required fields")]
    MissingFields,
    #[error("Invalid target terminal: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// A message relayed to an agent together with its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub source: String,
    pub target: String,
    pub message: String,
    pub response: AgentResponse,
}

/// Routes commands to the local executor or a remote agent.
pub struct TerminalRouter {
    classifier: Classifier,
    registry: Arc<TargetRegistry>,
    executor: Arc<dyn Executor>,
    agents: Arc<dyn AgentInvoker>,
    hub: Arc<BroadcastHub<ServerEvent>>,
    local_timeout: Duration,
}

impl TerminalRouter {
    /// Create a router with the default classifier and a 30 second local
    /// timeout.
    #[must_use]
    pub fn new(
        registry: Arc<TargetRegistry>,
        executor: Arc<dyn Executor>,
        agents: Arc<dyn AgentInvoker>,
        hub: Arc<BroadcastHub<ServerEvent>>,
    ) -> Self {
        Self {
            classifier: Classifier::default(),
            registry,
            executor,
            agents,
            hub,
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub const fn with_local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    /// Handle `event` on its own task and unicast the result to its session.
    pub fn dispatch(self: &Arc<Self>, event: CommandEvent) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let routed = router.route(&event.command, &event.terminal).await;
            if !router
                .hub
                .send_to(event.session, ServerEvent::CommandOutput(routed.result))
            {
                tracing::debug!(session_id = %event.session, "Session gone before result delivery");
            }
        })
    }

    /// Classify and run one command.
    pub async fn route(&self, command: &str, terminal: &str) -> Routed {
        tracing::debug!(terminal, "Command received");
        let command = command.trim();
        if command.is_empty() {
            tracing::debug!(terminal, "Command rejected: empty");
            return Routed::rejected(terminal, NO_COMMAND);
        }

        let targets = self.registry.snapshot();
        match self.classifier.classify(command, terminal, &targets) {
            Decision::Reject(rejection) => {
                tracing::debug!(terminal, reason = rejection.reason(), "Command rejected");
                Routed::rejected(terminal, rejection.to_string())
            }
            Decision::Local => {
                tracing::debug!(terminal, "Dispatching to local executor");
                self.run_local(command, terminal).await
            }
            Decision::Remote(agent) => {
                tracing::debug!(terminal, address = %agent.address, "Dispatching to agent");
                self.run_remote(&agent, command, terminal).await
            }
        }
    }

    async fn run_local(&self, command: &str, terminal: &str) -> Routed {
        match self.executor.run(command, self.local_timeout).await {
            Ok(out) => {
                tracing::debug!(terminal, exit_code = ?out.exit_code, "Command completed");
                Routed::completed(terminal, out.stdout, out.stderr)
            }
            Err(e) => {
                tracing::warn!(terminal, "Local command failed: {e}");
                Routed::failed(terminal, local_failure_message(&e))
            }
        }
    }

    async fn run_remote(&self, agent: &AgentTarget, command: &str, terminal: &str) -> Routed {
        match self
            .agents
            .invoke(agent, command, agent.class.default_timeout())
            .await
        {
            Ok(resp) => {
                tracing::debug!(terminal, agent_error = !resp.error.is_empty(), "Command completed");
                Routed::completed(terminal, resp.output, resp.error)
            }
            Err(e) => {
                tracing::warn!(terminal, "Agent call failed: {e}");
                Routed::failed(terminal, agent_failure_message(&e))
            }
        }
    }

    /// Send `message` from `source` to the agent `target` as a prompt and
    /// broadcast the exchange to every session.
    ///
    /// # Errors
    /// Returns error on empty fields, a target that is not a registered
    /// agent, or a failed agent call.
    pub async fn relay(&self, source: &str, target: &str, message: &str) -> Result<RelayReport, RelayError> {
        if source.trim().is_empty() || target.trim().is_empty() || message.trim().is_empty() {
            return Err(RelayError::MissingFields);
        }
        let Some(TerminalTarget::RemoteAgent(agent)) = self.registry.resolve(target) else {
            return Err(RelayError::InvalidTarget(target.to_string()));
        };

        let prompt = format!("{} --prompt {}", agent.invocation(), quote(message));
        tracing::info!(source, target, "Relaying message to agent");
        let response = self
            .agents
            .invoke(&agent, &prompt, AgentClass::Batch.default_timeout())
            .await?;

        let report = RelayReport {
            source: source.to_string(),
            target: target.to_string(),
            message: message.to_string(),
            response,
        };
        self.hub.publish(&ServerEvent::McpMessageReceived {
            source: report.source.clone(),
            target: report.target.clone(),
            message: report.message.clone(),
            response: report.response.clone(),
        });
        Ok(report)
    }

    /// Probe every registered agent concurrently.
    pub async fn container_status(&self) -> BTreeMap<String, AgentHealth> {
        let targets = self.registry.snapshot();
        let probes = targets.iter().map(|agent| async move {
            let health = if self.agents.health(agent).await {
                AgentHealth::Running
            } else {
                AgentHealth::Stopped
            };
            (agent.name.clone(), health)
        });
        futures::future::join_all(probes).await.into_iter().collect()
    }
}

fn local_failure_message(e: &ExecError) -> String {
    match e {
        ExecError::TimeoutExceeded(after) => format!(
            "Command was killed after {} seconds on the system terminal. Run long tasks in the background or split them up.",
            after.as_secs_f64()
        ),
        ExecError::CommandNotFound(program) => {
            format!("Command not found: {program}. Check that it is installed on the system terminal host.")
        }
        ExecError::Execution(message) => format!("System command error: {message}"),
    }
}

fn agent_failure_message(e: &AgentError) -> String {
    match e {
        AgentError::Timeout { terminal, after } => format!(
            "Command timed out on {terminal} after {} seconds. The AI agent may still be processing; try again shortly.",
            after.as_secs_f64()
        ),
        AgentError::Unreachable { terminal, .. } => {
            format!("Cannot connect to {terminal} container. Please check if the container is running.")
        }
        AgentError::Protocol { terminal, message } => {
            format!("Container communication error from {terminal}: {message}")
        }
    }
}

/// Wrap `message` in double quotes for the agent's shell.
fn quote(message: &str) -> String {
    let escaped = message.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
