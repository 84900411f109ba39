//! Core types for agent terminal routing.
//!
//! This crate provides the fundamental building blocks:
//! - `Classifier` - Pure command dispatch decisions
//! - `TargetRegistry` - Snapshot-based set of routable agents
//! - `BroadcastHub` - Session registry with bounded fan-out
//! - `ServerEvent` - Events delivered to sessions
//! - `Config` - TOML configuration
//! - Executor, agent, store and container runtime traits

pub mod classifier;
pub mod config;
pub mod event;
pub mod hub;
pub mod target;
pub mod traits;
pub mod workspace;

pub use classifier::{Classifier, Decision, Rejection};
pub use config::Config;
pub use event::{CommandResult, ServerEvent};
pub use hub::{BroadcastHub, SessionId, SessionState};
pub use target::{AgentClass, AgentTarget, TargetRegistry, TargetSet, TerminalTarget};
pub use traits::{AgentInvoker, ContainerRuntime, Executor, WorkspaceStore};
