//! Container runtime driven through the `docker` CLI.
//!
//! Any CLI accepting docker's `run`/`exec`/`ps` syntax works, so `podman`
//! can be configured as the binary.

use std::{process::Stdio, time::Duration};

use agent_terminal_core::traits::{
    ContainerRuntime, ContainerSpec, ContainerSummary, PortMapping, RuntimeError,
};
use async_trait::async_trait;
use tokio::process::Command;

const DEFAULT_BINARY: &str = "docker";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Docker CLI runtime.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
    timeout: Duration,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

impl DockerRuntime {
    /// Runtime invoking `binary`.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Limit how long a single CLI invocation may take.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn invoke(&self, args: &[String]) -> Result<String, RuntimeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RuntimeError::Unavailable(format!("{} not found in PATH", self.binary)));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(RuntimeError::CommandFailed(format!(
                    "{} {} timed out after {} seconds",
                    self.binary,
                    args.first().map_or("", String::as_str),
                    self.timeout.as_secs_f64()
                )));
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(RuntimeError::CommandFailed(if stderr.is_empty() {
                format!("{} exited with {}", self.binary, output.status)
            } else {
                stderr
            }))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        tracing::info!(name = %spec.name, image = %spec.image, "Starting container");
        self.invoke(&run_args(spec)).await
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<String, RuntimeError> {
        let mut args = vec!["exec".to_string(), name.to_string()];
        args.extend(command.iter().cloned());
        self.invoke(&args).await
    }

    async fn list(&self, name_filter: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let args = [
            "ps".to_string(),
            "--filter".to_string(),
            format!("name={name_filter}"),
            "--format".to_string(),
            "{{.Names}}\t{{.Ports}}".to_string(),
        ];
        let stdout = self.invoke(&args).await?;
        Ok(stdout.lines().filter_map(parse_ps_line).collect())
    }

    async fn healthcheck(&self, name: &str, port: u16) -> bool {
        let probe = [
            "curl".to_string(),
            "-f".to_string(),
            format!("http://localhost:{port}/health"),
        ];
        match self.exec(name, &probe).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(container = name, "Container health probe failed: {e}");
                false
            }
        }
    }
}

/// Arguments for `docker run`.
fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if let Some(network) = &spec.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    for (host, container) in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{host}:{container}"));
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

/// Parse one `{{.Names}}\t{{.Ports}}` line.
fn parse_ps_line(line: &str) -> Option<ContainerSummary> {
    let (name, ports) = line.split_once('\t').unwrap_or((line, ""));
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(ContainerSummary {
        name: name.to_string(),
        ports: parse_ports(ports),
    })
}

/// Parse docker's port column, e.g. `0.0.0.0:8003->8003/tcp, :::8003->8003/tcp`.
///
/// Exposed-but-unpublished ports carry no host side and are skipped.
fn parse_ports(column: &str) -> Vec<PortMapping> {
    let mut mappings: Vec<PortMapping> = Vec::new();
    for segment in column.split(',') {
        let Some((host_side, container_side)) = segment.trim().split_once("->") else {
            continue;
        };
        let host = host_side.rsplit(':').next().and_then(|p| p.parse().ok());
        let container = container_side.split('/').next().and_then(|p| p.parse().ok());
        if let (Some(host), Some(container)) = (host, container) {
            let mapping = PortMapping { host, container };
            if !mappings.contains(&mapping) {
                mappings.push(mapping);
            }
        }
    }
    mappings
}
