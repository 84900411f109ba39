//! Terminal targets and the routable-target registry.

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AgentConfig;

/// Canonical identifier of the local terminal.
pub const SYSTEM_TERMINAL: &str = "system";

const SYSTEM_ALIASES: &[&str] = &[SYSTEM_TERMINAL, "local-system"];

/// Whether `terminal` names the local system terminal.
#[must_use]
pub fn is_system_terminal(terminal: &str) -> bool {
    SYSTEM_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(terminal))
}

/// Timeout class of a remote agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentClass {
    /// Chat-style prompts.
    #[default]
    Interactive,
    /// Long-running invocations.
    Batch,
}

impl AgentClass {
    /// Default request timeout for this class.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        match self {
            Self::Interactive => Duration::from_secs(60),
            Self::Batch => Duration::from_secs(120),
        }
    }
}

/// A remote agent endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTarget {
    /// Unique terminal name.
    pub name: String,
    /// Base address without trailing slash.
    pub address: String,
    /// Lowercased invocation prefixes.
    pub prefixes: Vec<String>,
    /// Timeout class.
    pub class: AgentClass,
}

impl AgentTarget {
    /// Create a target with no invocation prefixes.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        let address: String = address.into();
        Self {
            name: name.into(),
            address: address.trim_end_matches('/').to_string(),
            prefixes: Vec::new(),
            class: AgentClass::default(),
        }
    }

    /// Set invocation prefixes.
    #[must_use]
    pub fn with_prefixes<I>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.prefixes = prefixes
            .into_iter()
            .map(|p| p.into().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    /// Set the timeout class.
    #[must_use]
    pub const fn with_class(mut self, class: AgentClass) -> Self {
        self.class = class;
        self
    }

    /// URL of the execute endpoint.
    #[must_use]
    pub fn execute_url(&self) -> String {
        format!("{}/execute", self.address)
    }

    /// URL of the health endpoint.
    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}/health", self.address)
    }

    /// Port of the base address, if it carries one.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        let authority = self
            .address
            .split_once("://")
            .map_or(self.address.as_str(), |(_, rest)| rest);
        let authority = authority.split('/').next().unwrap_or(authority);
        authority.rsplit_once(':')?.1.parse().ok()
    }

    /// Primary invocation keyword, used to build relayed prompts.
    #[must_use]
    pub fn invocation(&self) -> &str {
        self.prefixes
            .iter()
            .find(|p| !p.starts_with('-'))
            .map_or("gemini", String::as_str)
    }

    /// Whether an already-lowercased command begins with one of the prefixes.
    #[must_use]
    pub fn matches_prefix(&self, lowered: &str) -> bool {
        self.prefixes.iter().any(|p| lowered.starts_with(p.as_str()))
    }
}

impl From<&AgentConfig> for AgentTarget {
    fn from(config: &AgentConfig) -> Self {
        Self::new(&config.name, &config.address)
            .with_prefixes(config.prefixes.iter().cloned())
            .with_class(config.class)
    }
}

/// Where a command is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalTarget {
    /// The host running this service.
    LocalSystem,
    /// A registered remote agent.
    RemoteAgent(AgentTarget),
}

impl TerminalTarget {
    /// Terminal identifier used on the wire.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::LocalSystem => SYSTEM_TERMINAL,
            Self::RemoteAgent(agent) => &agent.name,
        }
    }
}

/// Immutable snapshot of the registered remote agents.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    agents: BTreeMap<String, AgentTarget>,
}

impl TargetSet {
    /// Look up an agent by terminal name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AgentTarget> {
        self.agents.get(name)
    }

    /// Iterate agents in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentTarget> {
        self.agents.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Whether any registered agent listens on `port`.
    #[must_use]
    pub fn uses_port(&self, port: u16) -> bool {
        self.agents.values().any(|a| a.port() == Some(port))
    }
}

/// Registry error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Terminal name already registered: {0}")]
    DuplicateName(String),
    #[error("Terminal name is reserved: {0}")]
    ReservedName(String),
}

/// Shared set of routable remote agents.
///
/// Readers take a cheap snapshot; writers swap in a new snapshot, so a
/// reader never sees a half-registered target.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    current: RwLock<Arc<TargetSet>>,
}

impl TargetRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured agents.
    ///
    /// # Errors
    /// Returns error on duplicate or reserved names.
    pub fn from_configs(configs: &[AgentConfig]) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for config in configs {
            registry.register(AgentTarget::from(config))?;
        }
        Ok(registry)
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TargetSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Add a target.
    ///
    /// # Errors
    /// Returns error if the name is taken or reserved.
    pub fn register(&self, target: AgentTarget) -> Result<(), RegistryError> {
        if is_system_terminal(&target.name) {
            return Err(RegistryError::ReservedName(target.name));
        }
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.agents.contains_key(&target.name) {
            return Err(RegistryError::DuplicateName(target.name));
        }
        let mut next = TargetSet::clone(&current);
        tracing::info!(terminal = %target.name, address = %target.address, "Registered agent target");
        next.agents.insert(target.name.clone(), target);
        *current = Arc::new(next);
        Ok(())
    }

    /// Resolve a terminal identifier against the current snapshot.
    #[must_use]
    pub fn resolve(&self, terminal: &str) -> Option<TerminalTarget> {
        if is_system_terminal(terminal) {
            return Some(TerminalTarget::LocalSystem);
        }
        self.snapshot()
            .get(terminal)
            .cloned()
            .map(TerminalTarget::RemoteAgent)
    }
}
