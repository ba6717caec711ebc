//! HTTP API server for integration with other systems.
//!
//! Runs the agent pipeline on request, streaming events as SSE or returning
//! the aggregated result, and exposes the agent graph and the run log.

use crate::audit::RunStore;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::stream::{collect, event_stream, RunEvent};
use crate::workflow::{RunHandle, WorkflowEngine};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};
use uuid::Uuid;

/// Cancellation tokens of in-flight runs, by run id.
#[derive(Default)]
struct RunRegistry {
    runs: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl RunRegistry {
    fn insert(&self, run_id: Uuid, token: CancellationToken) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(run_id, token);
        }
    }

    fn remove(&self, run_id: &Uuid) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.remove(run_id);
        }
    }

    fn contains(&self, run_id: &Uuid) -> bool {
        self.runs
            .lock()
            .map(|runs| runs.contains_key(run_id))
            .unwrap_or(false)
    }

    /// Cancel a run. Returns false if it is not in flight.
    fn cancel(&self, run_id: &Uuid) -> bool {
        let token = self
            .runs
            .lock()
            .ok()
            .and_then(|runs| runs.get(run_id).cloned());
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Shared application state.
struct AppState {
    engine: Arc<WorkflowEngine>,
    runs: RunRegistry,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Serve, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }
    for warning in preflight::warnings(&settings) {
        Output::warning(&warning);
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let engine = Arc::new(WorkflowEngine::from_settings(&settings)?);

    let state = Arc::new(AppState {
        engine,
        runs: RunRegistry::default(),
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("ShipShow API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Run pipeline", "POST /api/run");
    Output::kv("List agents", "GET  /api/agents");
    Output::kv("Get run", "GET  /api/runs/:run_id");
    Output::kv("Cancel run", "POST /api/runs/:run_id/cancel");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/run", post(run))
        .route("/api/agents", get(list_agents))
        .route("/api/runs/{run_id}", get(get_run))
        .route("/api/runs/{run_id}/cancel", post(cancel_run))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Debug, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
    /// Stream events as SSE. Otherwise wait and return the aggregated result.
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_stream() -> bool {
    true
}

impl RunRequest {
    /// User inputs for the run. A prompt wins over messages; only user-role
    /// messages are kept.
    fn inputs(&self) -> Result<Vec<String>, String> {
        if let Some(prompt) = &self.prompt {
            return Ok(vec![prompt.clone()]);
        }
        match &self.messages {
            Some(messages) => Ok(messages
                .iter()
                .filter(|m| m.role == "user")
                .map(|m| m.content.clone())
                .collect()),
            None => Err("Request needs either `prompt` or `messages`".to_string()),
        }
    }
}

#[derive(Serialize)]
struct AgentInfo {
    id: String,
    name: String,
    tools: Vec<String>,
    handoffs: Vec<String>,
    terminal: bool,
}

#[derive(Serialize)]
struct AgentListResponse {
    start: String,
    required_tools: Vec<String>,
    agents: Vec<AgentInfo>,
}

#[derive(Serialize)]
struct RunDetailResponse {
    run_id: Uuid,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifacts: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

fn to_sse(event: &RunEvent) -> Event {
    Event::default()
        .event(event.kind.name())
        .id(event.seq.to_string())
        .json_data(event)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn run(State(state): State<Arc<AppState>>, Json(req): Json<RunRequest>) -> Response {
    let inputs = match req.inputs() {
        Ok(inputs) => inputs,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let RunHandle {
        run_id,
        events,
        cancel,
        join,
    } = match state.engine.spawn(inputs) {
        Ok(handle) => handle,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    state.runs.insert(run_id, cancel.clone());
    let registry = state.clone();
    tokio::spawn(async move {
        if let Err(e) = join.await {
            warn!("Run task {} ended abnormally: {}", run_id, e);
        }
        registry.runs.remove(&run_id);
    });

    if !req.stream {
        return Json(collect(run_id, events).await).into_response();
    }

    // The run is cancelled if the client goes away before it finishes.
    let guard = cancel.drop_guard();
    let stream = event_stream(events).map(move |event| {
        let _ = &guard;
        Ok::<_, Infallible>(to_sse(&event))
    });

    debug!("Streaming run {}", run_id);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let graph = state.engine.graph();
    Json(AgentListResponse {
        start: graph.start().to_string(),
        required_tools: graph
            .guard()
            .required_tools()
            .iter()
            .map(|t| t.to_string())
            .collect(),
        agents: graph
            .agents()
            .map(|spec| AgentInfo {
                id: spec.id().to_string(),
                name: spec.name().to_string(),
                tools: spec.allowed_tools().iter().map(|t| t.to_string()).collect(),
                handoffs: spec.allowed_handoffs().iter().map(|a| a.to_string()).collect(),
                terminal: spec.is_terminal(),
            })
            .collect(),
    })
}

async fn get_run(State(state): State<Arc<AppState>>, Path(run_id): Path<Uuid>) -> Response {
    if let Some(store) = state.engine.audit() {
        match store.get(run_id).await {
            Ok(Some(record)) => {
                return Json(RunDetailResponse {
                    run_id,
                    status: record.status,
                    error_kind: record.error_kind.map(|k| k.to_string()),
                    output: Some(record.output),
                    transcript: serde_json::from_str(&record.transcript_json).ok(),
                    artifacts: serde_json::from_str(&record.artifacts_json).ok(),
                })
                .into_response();
            }
            Ok(None) => {}
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    if state.runs.contains(&run_id) {
        return Json(RunDetailResponse {
            run_id,
            status: "running".to_string(),
            error_kind: None,
            output: None,
            transcript: None,
            artifacts: None,
        })
        .into_response();
    }

    error_response(StatusCode::NOT_FOUND, format!("Run not found: {}", run_id))
}

async fn cancel_run(State(state): State<Arc<AppState>>, Path(run_id): Path<Uuid>) -> Response {
    if state.runs.cancel(&run_id) {
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "run_id": run_id, "cancelled": true })),
        )
            .into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("Run not in flight: {}", run_id))
    }
}
