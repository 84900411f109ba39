//! Shared handler state.

use std::sync::Arc;

use agent_terminal_core::{
    BroadcastHub, Classifier, Config, ServerEvent, TargetRegistry,
    target::RegistryError,
    traits::{AgentInvoker, ContainerRuntime, Executor, WorkspaceStore},
};
use agent_terminal_session::{LifecycleManager, TerminalRouter, WorkspaceService};

/// Services shared by the WebSocket and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub<ServerEvent>>,
    pub registry: Arc<TargetRegistry>,
    pub router: Arc<TerminalRouter>,
    pub workspace: Arc<WorkspaceService>,
    pub lifecycle: Arc<LifecycleManager>,
}

impl AppState {
    /// Wire the services from configuration and collaborator backends.
    ///
    /// # Errors
    /// Returns error if the configured agents have duplicate or reserved
    /// names.
    pub fn from_config(
        config: &Config,
        executor: Arc<dyn Executor>,
        agents: Arc<dyn AgentInvoker>,
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn WorkspaceStore>,
    ) -> Result<Self, RegistryError> {
        let hub = Arc::new(BroadcastHub::new(config.hub.session_buffer));
        let registry = Arc::new(TargetRegistry::from_configs(&config.agents)?);

        let router = TerminalRouter::new(Arc::clone(&registry), executor, agents, Arc::clone(&hub))
            .with_classifier(Classifier::new(config.executor.deny_list.iter().cloned()))
            .with_local_timeout(config.executor.local_timeout());
        let workspace = WorkspaceService::new(store, Arc::clone(&hub));
        let lifecycle = LifecycleManager::new(config.lifecycle.clone(), runtime, Arc::clone(&registry), Arc::clone(&hub));

        Ok(Self {
            hub,
            registry,
            router: Arc::new(router),
            workspace: Arc::new(workspace),
            lifecycle: Arc::new(lifecycle),
        })
    }
}
