//! Agent terminal server.
//!
//! Serves the WebSocket endpoint at `/ws` and the HTTP API under `/api`.
//!
//! Run with: cargo run -p agent-terminal-server -- --config agent-terminal.toml

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use agent_terminal_core::Config;
use agent_terminal_executor::{DockerRuntime, HttpAgentClient, ProcessExecutor};
use agent_terminal_session::storage::MemoryStore;
use agent_terminal_transport::{AppState, router};
use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "agent-terminal-server", version, about, long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "AGENT_TERMINAL_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// TOML configuration file. Built-in defaults apply when it is missing.
    #[arg(long, env = "AGENT_TERMINAL_CONFIG", default_value = "agent-terminal.toml")]
    config: PathBuf,

    /// Working directory for system terminal commands.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `agent_terminal_session=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,

    /// Container CLI used to spawn agent terminals.
    #[arg(long, env = "AGENT_TERMINAL_DOCKER", default_value = "docker")]
    docker: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| "info".into()))
        .init();

    let config = match Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?
    {
        Some(config) => {
            tracing::info!(path = %cli.config.display(), "Loaded configuration");
            config
        }
        None => {
            tracing::info!(path = %cli.config.display(), "No configuration file, using defaults");
            Config::default()
        }
    };

    let executor = cli
        .working_dir
        .map_or_else(ProcessExecutor::new, ProcessExecutor::with_working_dir);
    let agents = HttpAgentClient::new().context("failed to build agent HTTP client")?;

    let state = AppState::from_config(
        &config,
        Arc::new(executor),
        Arc::new(agents),
        Arc::new(DockerRuntime::new(cli.docker)),
        Arc::new(MemoryStore::new()),
    )
    .context("invalid agent configuration")?;
    tracing::info!(agents = state.registry.snapshot().len(), "Registered agent terminals");

    let app = router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    tracing::info!("Server listening on http://{}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
