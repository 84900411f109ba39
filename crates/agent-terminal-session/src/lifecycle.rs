//! Agent container lifecycle.
//!
//! Spawning allocates a port, launches a container, waits for it to settle,
//! probes its health and only then makes it routable.

use std::{collections::BTreeSet, sync::Arc};

use agent_terminal_core::{
    BroadcastHub, ServerEvent, TargetRegistry,
    config::LifecycleConfig,
    event::TerminalInfo,
    target::{AgentTarget, RegistryError},
    traits::{ContainerRuntime, ContainerSpec, RuntimeError},
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Lifecycle error.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("No free port between {start} and {end}")]
    PortExhausted { start: u16, end: u16 },
    #[error("Port {0} is already in use")]
    PortInUse(u16),
    #[error("Failed to spawn container: {0}")]
    LaunchFailed(String),
    #[error("Container {container} started but health check failed on port {port}")]
    HealthCheckFailed { container: String, port: u16 },
    #[error(transparent)]
    Registration(#[from] RegistryError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// A spawned, healthy and registered agent terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnedTerminal {
    pub terminal_id: String,
    pub container_id: String,
    pub container_name: String,
    pub port: u16,
    pub address: String,
}

/// A running agent container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedTerminal {
    pub name: String,
    pub port: u16,
    pub terminal_id: String,
}

/// Spawns agent containers and registers them as routable targets.
pub struct LifecycleManager {
    config: LifecycleConfig,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<TargetRegistry>,
    hub: Arc<BroadcastHub<ServerEvent>>,
    /// Held for a whole spawn so two spawns never pick the same port.
    spawn_lock: Mutex<()>,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(
        config: LifecycleConfig,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<TargetRegistry>,
        hub: Arc<BroadcastHub<ServerEvent>>,
    ) -> Self {
        Self {
            config,
            runtime,
            registry,
            hub,
            spawn_lock: Mutex::new(()),
        }
    }

    /// Launch an agent from `image` (or the configured image) on
    /// `desired_port` (or the lowest free port in range).
    ///
    /// A container that fails its health probe is left running and is not
    /// registered.
    ///
    /// # Errors
    /// Returns error when no port is available, the launch fails, the health
    /// probe fails, or the derived terminal name is already registered.
    pub async fn spawn(&self, image: Option<&str>, desired_port: Option<u16>) -> Result<SpawnedTerminal, LifecycleError> {
        let _guard = self.spawn_lock.lock().await;

        let taken = self.taken_ports().await;
        let port = match desired_port {
            Some(port) if port == 0 || taken.contains(&port) => return Err(LifecycleError::PortInUse(port)),
            Some(port) => port,
            None => (self.config.port_start..=self.config.port_end)
                .find(|p| !taken.contains(p))
                .ok_or(LifecycleError::PortExhausted {
                    start: self.config.port_start,
                    end: self.config.port_end,
                })?,
        };

        let terminal_id = format!("{}-{port}", self.config.terminal_prefix);
        if self.registry.snapshot().get(&terminal_id).is_some() {
            return Err(RegistryError::DuplicateName(terminal_id).into());
        }
        let container_name = format!("{}-{port}", self.config.container_prefix);
        let spec = self.container_spec(image, &container_name, port);

        let container_id = self
            .runtime
            .run(&spec)
            .await
            .map_err(|e| LifecycleError::LaunchFailed(e.to_string()))?;
        tracing::info!(container = %container_name, port, "Agent container launched, waiting to settle");

        tokio::time::sleep(self.config.settle_time()).await;
        let healthy = tokio::time::timeout(
            self.config.health_timeout(),
            self.runtime.healthcheck(&container_name, port),
        )
        .await
        .unwrap_or(false);
        if !healthy {
            tracing::warn!(container = %container_name, port, "Agent container failed health check");
            return Err(LifecycleError::HealthCheckFailed {
                container: container_name,
                port,
            });
        }

        let address = match &self.config.network {
            Some(_) => format!("http://{container_name}:{port}"),
            None => format!("http://{}:{port}", self.config.host),
        };
        self.registry.register(
            AgentTarget::new(&terminal_id, &address)
                .with_prefixes(self.config.prefixes.iter().cloned())
                .with_class(self.config.class),
        )?;

        let spawned = SpawnedTerminal {
            terminal_id,
            container_id,
            container_name,
            port,
            address,
        };
        self.hub.publish(&ServerEvent::TerminalSpawned(TerminalInfo {
            terminal_id: spawned.terminal_id.clone(),
            container_name: spawned.container_name.clone(),
            port: spawned.port,
            address: spawned.address.clone(),
        }));
        Ok(spawned)
    }

    /// Running agent containers. Advisory: the runtime may know containers
    /// that are not routable, and vice versa.
    ///
    /// # Errors
    /// Returns error if the runtime cannot be queried.
    pub async fn list(&self) -> Result<Vec<ListedTerminal>, LifecycleError> {
        let containers = self.runtime.list(&self.config.container_prefix).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let port = c.ports.first()?.host;
                Some(ListedTerminal {
                    terminal_id: format!("{}-{port}", self.config.terminal_prefix),
                    name: c.name,
                    port,
                })
            })
            .collect())
    }

    async fn taken_ports(&self) -> BTreeSet<u16> {
        let mut taken: BTreeSet<u16> = self.registry.snapshot().iter().filter_map(AgentTarget::port).collect();
        match self.runtime.list(&self.config.container_prefix).await {
            Ok(containers) => taken.extend(containers.iter().flat_map(|c| c.ports.iter().map(|p| p.host))),
            Err(e) => tracing::warn!("Could not list running containers, using registered ports only: {e}"),
        }
        taken
    }

    fn container_spec(&self, image: Option<&str>, name: &str, port: u16) -> ContainerSpec {
        let mut env: Vec<(String, String)> = self
            .config
            .forward_env
            .iter()
            .map(|key| (key.clone(), std::env::var(key).unwrap_or_default()))
            .collect();
        env.push(("MCP_PORT".to_string(), port.to_string()));

        ContainerSpec {
            image: image
                .filter(|i| !i.trim().is_empty())
                .unwrap_or(self.config.image.as_str())
                .to_string(),
            name: name.to_string(),
            ports: vec![(port, port)],
            env,
            network: self.config.network.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use agent_terminal_core::traits::{ContainerSummary, PortMapping};
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    struct FakeRuntime {
        running: StdMutex<Vec<ContainerSummary>>,
        launched: StdMutex<Vec<ContainerSpec>>,
        unhealthy: bool,
        list_fails: bool,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
            if spec.image == "broken" {
                return Err(RuntimeError::CommandFailed("pull access denied".into()));
            }
            self.launched.lock().unwrap().push(spec.clone());
            self.running.lock().unwrap().push(ContainerSummary {
                name: spec.name.clone(),
                ports: spec
                    .ports
                    .iter()
                    .map(|&(host, container)| PortMapping { host, container })
                    .collect(),
            });
            Ok(format!("id-{}", spec.name))
        }

        async fn exec(&self, _name: &str, _command: &[String]) -> Result<String, RuntimeError> {
            Ok(String::new())
        }

        async fn list(&self, name_filter: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
            if self.list_fails {
                return Err(RuntimeError::Unavailable("docker not found".into()));
            }
            Ok(self
                .running
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.name.contains(name_filter))
                .cloned()
                .collect())
        }

        async fn healthcheck(&self, _name: &str, _port: u16) -> bool {
            !self.unhealthy
        }
    }

    fn config() -> LifecycleConfig {
        LifecycleConfig {
            settle_ms: 0,
            port_start: 8003,
            port_end: 8005,
            ..LifecycleConfig::default()
        }
    }

    fn setup(runtime: Arc<FakeRuntime>, config: LifecycleConfig) -> (LifecycleManager, Arc<TargetRegistry>, Arc<BroadcastHub<ServerEvent>>) {
        let registry = Arc::new(TargetRegistry::new());
        let hub = Arc::new(BroadcastHub::new(16));
        let manager = LifecycleManager::new(config, runtime, Arc::clone(&registry), Arc::clone(&hub));
        (manager, registry, hub)
    }

    #[tokio::test]
    async fn spawn_skips_port_of_registered_target() {
        let (manager, registry, hub) = setup(Arc::default(), config());
        registry.register(AgentTarget::new("gemini-a", "http://127.0.0.1:8003")).unwrap();
        let (tx, mut rx) = hub.channel();
        hub.register(Uuid::new_v4(), tx);

        let spawned = manager.spawn(None, None).await.unwrap();
        assert_eq!(spawned.port, 8004);
        assert_eq!(spawned.terminal_id, "gemini-8004");
        assert_eq!(spawned.container_name, "gemini-cli-container-8004");
        assert_eq!(spawned.address, "http://127.0.0.1:8004");
        assert!(registry.resolve("gemini-8004").is_some());
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::TerminalSpawned(ref info)) if info.port == 8004));
    }

    #[tokio::test]
    async fn spawn_skips_ports_of_running_containers() {
        let runtime = Arc::new(FakeRuntime::default());
        runtime.running.lock().unwrap().push(ContainerSummary {
            name: "gemini-cli-container-8003".into(),
            ports: vec![PortMapping { host: 8003, container: 8003 }],
        });
        let (manager, _, _) = setup(Arc::clone(&runtime), config());

        assert_eq!(manager.spawn(None, None).await.unwrap().port, 8004);
        assert_eq!(manager.spawn(None, None).await.unwrap().port, 8005);
        assert!(matches!(
            manager.spawn(None, None).await,
            Err(LifecycleError::PortExhausted { start: 8003, end: 8005 })
        ));
    }

    #[tokio::test]
    async fn launch_spec_carries_env_and_network() {
        let runtime = Arc::new(FakeRuntime::default());
        let config = LifecycleConfig {
            network: Some("agents".into()),
            forward_env: Vec::new(),
            ..config()
        };
        let (manager, _, _) = setup(Arc::clone(&runtime), config);

        let spawned = manager.spawn(Some("custom:1"), Some(8010)).await.unwrap();
        assert_eq!(spawned.address, "http://gemini-cli-container-8010:8010");

        let launched = runtime.launched.lock().unwrap();
        assert_eq!(launched[0].image, "custom:1");
        assert_eq!(launched[0].network.as_deref(), Some("agents"));
        assert_eq!(launched[0].env, vec![("MCP_PORT".to_string(), "8010".to_string())]);
    }

    #[tokio::test]
    async fn unhealthy_container_is_not_registered() {
        let runtime = Arc::new(FakeRuntime {
            unhealthy: true,
            ..FakeRuntime::default()
        });
        let (manager, registry, _) = setup(runtime, config());

        assert!(matches!(
            manager.spawn(None, None).await,
            Err(LifecycleError::HealthCheckFailed { port: 8003, .. })
        ));
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn launch_failure_and_taken_port() {
        let (manager, registry, _) = setup(Arc::default(), config());
        assert!(matches!(
            manager.spawn(Some("broken"), None).await,
            Err(LifecycleError::LaunchFailed(ref m)) if m.contains("pull access denied")
        ));

        registry.register(AgentTarget::new("gemini-1", "http://127.0.0.1:8001")).unwrap();
        assert!(matches!(
            manager.spawn(None, Some(8001)).await,
            Err(LifecycleError::PortInUse(8001))
        ));
    }

    #[tokio::test]
    async fn list_failure_falls_back_to_registered_ports() {
        let runtime = Arc::new(FakeRuntime {
            list_fails: true,
            ..FakeRuntime::default()
        });
        let (manager, _, _) = setup(runtime, config());

        assert_eq!(manager.spawn(None, None).await.unwrap().port, 8003);
        assert!(matches!(manager.list().await, Err(LifecycleError::Runtime(_))));
    }

    #[tokio::test]
    async fn list_reports_running_agents() {
        let (manager, _, _) = setup(Arc::default(), config());
        manager.spawn(None, None).await.unwrap();

        let listed = manager.list().await.unwrap();
        assert_eq!(
            listed,
            vec![ListedTerminal {
                name: "gemini-cli-container-8003".into(),
                port: 8003,
                terminal_id: "gemini-8003".into(),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_spawns_never_share_a_port() {
        // With the runtime unable to list, only registered ports count as
        // taken, and registration happens after the settle wait.
        let runtime = Arc::new(FakeRuntime {
            list_fails: true,
            ..FakeRuntime::default()
        });
        let (manager, registry, _) = setup(runtime, LifecycleConfig { settle_ms: 50, ..config() });
        let manager = Arc::new(manager);

        let spawns: Vec<_> = (0..2)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.spawn(None, None).await })
            })
            .collect();
        let mut ports = Vec::new();
        for spawn in spawns {
            ports.push(spawn.await.unwrap().unwrap().port);
        }
        ports.sort_unstable();

        assert_eq!(ports, [8003, 8004]);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
