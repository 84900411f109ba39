//! HTTP API.
//!
//! A thin JSON surface over the same services the WebSocket sessions use.
//! Errors are returned as `{"error": <message>, "code": <code>}`.

use agent_terminal_core::{
    CommandResult,
    target::{AgentClass, SYSTEM_TERMINAL},
    traits::{AgentError, StoreError},
};
use agent_terminal_session::{
    LifecycleError, RelayError, WorkspaceError,
    lifecycle::SpawnedTerminal,
    workspace::{NewProgress, NewTask, UploadFile},
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::state::AppState;

/// API error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    GatewayTimeout(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadGateway(_) => "bad_gateway",
            Self::GatewayTimeout(_) => "gateway_timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::FileNotFound(_) | WorkspaceError::TaskNotFound(_) => Self::NotFound(e.to_string()),
            WorkspaceError::Invalid(_) => Self::InvalidRequest(e.to_string()),
            WorkspaceError::Store(StoreError::Unavailable(_)) => Self::Unavailable(e.to_string()),
            WorkspaceError::Store(StoreError::Internal(_)) | WorkspaceError::Corrupt { .. } => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::PortInUse(_) | LifecycleError::Registration(_) => Self::Conflict(e.to_string()),
            LifecycleError::PortExhausted { .. } | LifecycleError::Runtime(_) => Self::Unavailable(e.to_string()),
            LifecycleError::LaunchFailed(_) | LifecycleError::HealthCheckFailed { .. } => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::MissingFields | RelayError::InvalidTarget(_) => Self::InvalidRequest(e.to_string()),
            RelayError::Agent(AgentError::Timeout { .. }) => Self::GatewayTimeout(e.to_string()),
            RelayError::Agent(_) => Self::BadGateway(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    command: String,
    #[serde(default)]
    terminal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SpawnRequest {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Debug, Serialize)]
struct SpawnResponse {
    success: bool,
    #[serde(flatten)]
    terminal: SpawnedTerminal,
}

#[derive(Debug, Deserialize)]
struct RelayRequest {
    #[serde(default)]
    source: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    message: String,
}

/// A routable terminal.
#[derive(Debug, Serialize)]
struct TerminalEntry {
    terminal_id: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<AgentClass>,
}

/// Build the API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/execute", post(execute))
        .route("/api/workspace/upload", post(upload_file))
        .route("/api/workspace/files", get(list_files))
        .route("/api/workspace/file/{name}", get(get_file))
        .route("/api/workspace/task", post(create_task))
        .route("/api/workspace/tasks", get(list_tasks))
        .route("/api/workspace/task/{id}", get(get_task))
        .route("/api/workspace/task/{id}/progress", post(append_progress))
        .route("/api/terminals", get(list_registered))
        .route("/api/terminals/spawn", post(spawn_terminal))
        .route("/api/terminals/list", get(list_running))
        .route("/api/containers/status", get(container_status))
        .route("/api/mcp/communicate", post(communicate))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "sessions": state.hub.len(),
        "agents": state.registry.snapshot().len(),
    }))
}

async fn execute(State(state): State<AppState>, Json(req): Json<ExecuteRequest>) -> Json<CommandResult> {
    let terminal = req.terminal.unwrap_or_else(|| SYSTEM_TERMINAL.to_string());
    let routed = state.router.route(&req.command, &terminal).await;
    Json(routed.result)
}

async fn upload_file(State(state): State<AppState>, Json(req): Json<UploadFile>) -> Result<Json<Value>, ApiError> {
    let file = state.workspace.upload_file(req).await?;
    Ok(Json(json!({
        "success": true,
        "file_name": file.name,
        "type": file.file_type,
        "uploaded_at": file.uploaded_at,
    })))
}

async fn list_files(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let files = state.workspace.list_files().await?;
    Ok(Json(json!({ "files": files })))
}

async fn get_file(State(state): State<AppState>, Path(name): Path<String>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.workspace.get_file(&name).await?))
}

async fn create_task(State(state): State<AppState>, Json(req): Json<NewTask>) -> Result<Json<Value>, ApiError> {
    let task = state.workspace.create_task(req).await?;
    Ok(Json(json!({
        "success": true,
        "task_id": task.id,
        "task": task,
    })))
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tasks = state.workspace.list_tasks().await?;
    Ok(Json(json!({ "tasks": tasks })))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.workspace.get_task(&id).await?))
}

async fn append_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NewProgress>,
) -> Result<Json<Value>, ApiError> {
    let progress = state.workspace.append_progress(&id, req).await?;
    Ok(Json(json!({
        "success": true,
        "progress": progress,
    })))
}

async fn list_registered(State(state): State<AppState>) -> Json<Value> {
    let mut terminals = vec![TerminalEntry {
        terminal_id: SYSTEM_TERMINAL.to_string(),
        kind: "local",
        address: None,
        class: None,
    }];
    terminals.extend(state.registry.snapshot().iter().map(|agent| TerminalEntry {
        terminal_id: agent.name.clone(),
        kind: "agent",
        address: Some(agent.address.clone()),
        class: Some(agent.class),
    }));
    Json(json!({ "terminals": terminals }))
}

async fn spawn_terminal(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SpawnResponse>, ApiError> {
    // An empty body asks for the configured image on the next free port.
    let req: SpawnRequest = if body.is_empty() {
        SpawnRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidRequest(format!("Invalid spawn request: {e}")))?
    };
    let terminal = state.lifecycle.spawn(req.image.as_deref(), req.port).await?;
    Ok(Json(SpawnResponse { success: true, terminal }))
}

async fn list_running(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let terminals = state.lifecycle.list().await?;
    Ok(Json(json!({ "terminals": terminals })))
}

async fn container_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.router.container_status().await)
}

async fn communicate(State(state): State<AppState>, Json(req): Json<RelayRequest>) -> Result<impl IntoResponse, ApiError> {
    let report = state.router.relay(&req.source, &req.target, &req.message).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use std::{path::Path as FsPath, sync::Arc, sync::Mutex, time::Duration};

    use agent_terminal_core::{
        Config,
        config::AgentConfig,
        target::AgentTarget,
        traits::{
            AgentInvoker, AgentResponse, ContainerRuntime, ContainerSpec, ContainerSummary, PortMapping,
            RuntimeError,
        },
    };
    use agent_terminal_executor::ProcessExecutor;
    use agent_terminal_session::storage::MemoryStore;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    struct EchoAgents;

    #[async_trait]
    impl AgentInvoker for EchoAgents {
        async fn invoke(
            &self,
            _target: &AgentTarget,
            command: &str,
            _timeout: Duration,
        ) -> Result<AgentResponse, AgentError> {
            Ok(AgentResponse {
                output: format!("echo: {command}"),
                error: String::new(),
            })
        }

        async fn health(&self, _target: &AgentTarget) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeRuntime {
        running: Mutex<Vec<ContainerSummary>>,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
            self.running.lock().unwrap().push(ContainerSummary {
                name: spec.name.clone(),
                ports: spec
                    .ports
                    .iter()
                    .map(|&(host, container)| PortMapping { host, container })
                    .collect(),
            });
            Ok("abc123".into())
        }

        async fn exec(&self, _name: &str, _command: &[String]) -> Result<String, RuntimeError> {
            Ok(String::new())
        }

        async fn list(&self, _name_filter: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
            Ok(self.running.lock().unwrap().clone())
        }

        async fn healthcheck(&self, _name: &str, _port: u16) -> bool {
            true
        }
    }

    fn app(workdir: &FsPath) -> Router {
        let mut config = Config::default();
        config.agents = vec![AgentConfig {
            name: "gemini-1".into(),
            address: "http://gemini-cli-container-1:8001".into(),
            prefixes: vec!["gemini".into(), "--help".into(), "-h".into()],
            class: AgentClass::Interactive,
        }];
        config.lifecycle.settle_ms = 0;
        let state = AppState::from_config(
            &config,
            Arc::new(ProcessExecutor::with_working_dir(workdir)),
            Arc::new(EchoAgents),
            Arc::new(FakeRuntime::default()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        crate::router(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_ls_on_local_system() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let app = app(dir.path());

        let (status, body) = call(
            &app,
            "POST",
            "/api/execute",
            Some(json!({"command": "ls", "terminal": "local-system"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["output"].as_str().unwrap().contains("notes.txt"));
        assert_eq!(body["error"], "");
        assert_eq!(body["terminal"], "local-system");
    }

    #[tokio::test]
    async fn execute_routes_prompts_and_rejects_system_commands() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (_, body) = call(
            &app,
            "POST",
            "/api/execute",
            Some(json!({"command": "gemini --help", "terminal": "gemini-1"})),
        )
        .await;
        assert_eq!(body["output"], "echo: gemini --help");

        let (_, body) = call(
            &app,
            "POST",
            "/api/execute",
            Some(json!({"command": "rm -rf /", "terminal": "gemini-1"})),
        )
        .await;
        assert_eq!(body["output"], "");
        assert!(body["error"].as_str().unwrap().contains("System Terminal"));

        let (_, body) = call(&app, "POST", "/api/execute", Some(json!({"command": ""}))).await;
        assert_eq!(body["error"], "No command provided");
    }

    #[tokio::test]
    async fn workspace_files() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        for content in ["one", "two"] {
            let (status, body) = call(
                &app,
                "POST",
                "/api/workspace/upload",
                Some(json!({"name": "notes.txt", "content": content})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
        }

        let (_, body) = call(&app, "GET", "/api/workspace/files", None).await;
        assert_eq!(body["files"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "GET", "/api/workspace/file/notes.txt", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "two");
        assert_eq!(body["type"], "text");

        let (status, body) = call(&app, "GET", "/api/workspace/file/missing.txt", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn workspace_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (_, body) = call(
            &app,
            "POST",
            "/api/workspace/task",
            Some(json!({"name": "Port parser", "terminals": ["gemini-1"]})),
        )
        .await;
        let id = body["task_id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/workspace/task/{id}/progress"),
            Some(json!({"terminal": "gemini-1", "action": "started"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, task) = call(&app, "GET", &format!("/api/workspace/task/{id}"), None).await;
        assert_eq!(task["progress"][0]["action"], "started");

        let (_, body) = call(&app, "GET", "/api/workspace/tasks", None).await;
        assert_eq!(body["tasks"][0]["name"], "Port parser");

        let (status, _) = call(
            &app,
            "POST",
            "/api/workspace/task/task_unknown/progress",
            Some(json!({"terminal": "gemini-1", "action": "started"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn spawn_registers_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, body) = call(&app, "POST", "/api/terminals/spawn", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["port"], 8003);
        assert_eq!(body["terminal_id"], "gemini-8003");

        let (_, body) = call(&app, "GET", "/api/terminals", None).await;
        let ids: Vec<_> = body["terminals"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["terminal_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["system", "gemini-1", "gemini-8003"]);

        let (_, body) = call(&app, "GET", "/api/terminals/list", None).await;
        assert_eq!(body["terminals"][0]["terminal_id"], "gemini-8003");

        let (status, body) = call(&app, "POST", "/api/terminals/spawn", Some(json!({"port": 8001}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "conflict");
    }

    #[tokio::test]
    async fn relay_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let (status, _) = call(
            &app,
            "POST",
            "/api/mcp/communicate",
            Some(json!({"source": "gemini-2", "target": "gemini-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            "/api/mcp/communicate",
            Some(json!({"source": "gemini-2", "target": "gemini-1", "message": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["output"], "echo: gemini --prompt \"hello\"");

        let (_, body) = call(&app, "GET", "/api/containers/status", None).await;
        assert_eq!(body, json!({"gemini-1": "running"}));

        let (_, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(body["status"], "healthy");
    }

    #[test]
    fn error_status_codes() {
        let timeout = ApiError::from(RelayError::Agent(AgentError::Timeout {
            terminal: "gemini-1".into(),
            after: Duration::from_secs(120),
        }));
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let exhausted = ApiError::from(LifecycleError::PortExhausted { start: 1, end: 2 });
        assert_eq!(exhausted.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let missing = ApiError::from(WorkspaceError::TaskNotFound("task_x".into()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "not_found");
    }
}
