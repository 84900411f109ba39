//! Runtime configuration, loaded from TOML.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::{AgentClass, is_system_terminal};

/// Shell utilities that must not be sent to an agent terminal.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "npm", "npx", "git", "ls", "pwd", "cd", "mkdir", "rm", "cp", "mv",
];

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local process execution.
    pub executor: ExecutorConfig,
    /// Remote agents registered at startup.
    pub agents: Vec<AgentConfig>,
    /// Dynamic agent container spawning.
    pub lifecycle: LifecycleConfig,
    /// Session fan-out.
    pub hub: HubConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            agents: vec![
                AgentConfig {
                    name: "gemini-1".into(),
                    address: "http://gemini-cli-container-1:8001".into(),
                    prefixes: strings(&["gemini", "--help", "-h"]),
                    class: AgentClass::Interactive,
                },
                AgentConfig {
                    name: "gemini-2".into(),
                    address: "http://gemini-cli-container-2:8002".into(),
                    prefixes: strings(&["gemini", "--prompt", "-p"]),
                    class: AgentClass::Interactive,
                },
            ],
            lifecycle: LifecycleConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

/// Local process executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Wall-clock limit for local commands.
    pub local_timeout_secs: u64,
    /// Tokens that mark a command as a system command on agent terminals.
    pub deny_list: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            local_timeout_secs: 30,
            deny_list: strings(DEFAULT_DENY_LIST),
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub const fn local_timeout(&self) -> Duration {
        Duration::from_secs(self.local_timeout_secs)
    }
}

/// A statically configured remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Terminal identifier, e.g. `gemini-1`.
    pub name: String,
    /// Base address, e.g. `http://gemini-cli-container-1:8001`.
    pub address: String,
    /// Invocation prefixes that always route to the agent.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
    /// Timeout class.
    #[serde(default)]
    pub class: AgentClass,
}

/// Settings for spawning agent containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Image used when a spawn request names none.
    pub image: String,
    /// First port handed out to spawned agents.
    pub port_start: u16,
    /// Last port (inclusive).
    pub port_end: u16,
    /// Wait between launch and the first health probe.
    pub settle_ms: u64,
    /// Upper bound for a single health probe.
    pub health_timeout_secs: u64,
    /// Container network to attach to. When set, agents are addressed by
    /// container name; otherwise by `host`.
    pub network: Option<String>,
    /// Host used to address agents when no network is configured.
    pub host: String,
    /// Container name prefix; the port is appended.
    pub container_prefix: String,
    /// Terminal name prefix; the port is appended.
    pub terminal_prefix: String,
    /// Invocation prefixes given to spawned agents.
    pub prefixes: Vec<String>,
    /// Timeout class for spawned agents.
    pub class: AgentClass,
    /// Host environment variables forwarded into spawned containers.
    pub forward_env: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            image: "agent-terminal/gemini-cli:latest".into(),
            port_start: 8003,
            port_end: 8099,
            settle_ms: 2000,
            health_timeout_secs: 30,
            network: None,
            host: "127.0.0.1".into(),
            container_prefix: "gemini-cli-container".into(),
            terminal_prefix: "gemini".into(),
            prefixes: default_prefixes(),
            class: AgentClass::Interactive,
            forward_env: strings(&["GEMINI_API_KEY"]),
        }
    }
}

impl LifecycleConfig {
    #[must_use]
    pub const fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Broadcast hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Events buffered per session before the session is dropped.
    pub session_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            session_buffer: 256,
        }
    }
}

/// Errors that can occur when loading config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load config from a TOML file path. Returns `None` if the file doesn't exist.
    ///
    /// # Errors
    /// Returns error if the file can't be read, parsed or fails validation.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map(Some)
    }

    /// Parse and validate config from a TOML string.
    ///
    /// # Errors
    /// Returns error on malformed TOML or invalid values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::Invalid("agent name must not be empty".into()));
            }
            if is_system_terminal(&agent.name) {
                return Err(ConfigError::Invalid(format!(
                    "agent name '{}' is reserved for the local terminal",
                    agent.name
                )));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
            if !agent.address.starts_with("http://") && !agent.address.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "agent '{}' address must be an http(s) URL, got '{}'",
                    agent.name, agent.address
                )));
            }
        }
        if self.lifecycle.port_start > self.lifecycle.port_end {
            return Err(ConfigError::Invalid(format!(
                "lifecycle port range is empty ({}..={})",
                self.lifecycle.port_start, self.lifecycle.port_end
            )));
        }
        if self.hub.session_buffer == 0 {
            return Err(ConfigError::Invalid("hub.session_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_prefixes() -> Vec<String> {
    strings(&["gemini", "--prompt", "-p"])
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
