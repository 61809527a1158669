//! IPC server: an axum router served over a Unix domain socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use aide_config::AppConfig;

use super::types::*;
use crate::chat::{ChatContextHandle, ChatTurn};
use crate::daemon::ShutdownSignal;
use crate::logging::LogReader;
use crate::search::{SearchEngine, SearchOptions};
use crate::tools::{ToolError, ToolRegistry, ToolResult};

/// Shared state for every route handler.
pub struct IpcState {
    pub config: watch::Receiver<AppConfig>,
    pub shutdown_tx: broadcast::Sender<ShutdownSignal>,
    pub search: Arc<SearchEngine>,
    pub tools: Arc<ToolRegistry>,
    /// The session transcript tool calls are recorded in.
    pub chat: ChatContextHandle,
    pub logs: Option<LogReader>,
    pub started_at: Instant,
}

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/aide.sock";

const DEFAULT_LOG_LIMIT: usize = 200;
const DEFAULT_SEARCH_LIMIT: usize = 20;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub fn router(state: Arc<IpcState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/stop", post(handle_stop))
        .route("/config", get(handle_config))
        .route("/logs", get(handle_logs))
        .route("/tools", get(handle_tools))
        .route("/tools/invoke", post(handle_invoke))
        .route("/chat/history", get(handle_history))
        .route("/chat/turn", post(handle_turn))
        .route("/search", get(handle_search))
        .route("/search/rebuild", post(handle_rebuild))
        .with_state(state)
}

/// Serve the API on `socket_path` until a shutdown signal arrives.
///
/// A stale socket file is removed before binding and the socket is removed
/// again on exit.
pub async fn serve(
    socket_path: &Path,
    state: Arc<IpcState>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), std::io::Error> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "IPC server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("IPC server shutting down");
        })
        .await?;

    std::fs::remove_file(socket_path).ok();
    Ok(())
}

pub fn socket_path_from_config(config: &AppConfig) -> PathBuf {
    config
        .daemon
        .socket_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        build_profile: crate::build_info::BUILD_PROFILE.to_string(),
    })
}

async fn handle_status(State(state): State<Arc<IpcState>>) -> Json<StatusResponse> {
    let log_level = state.config.borrow().logging.level.clone();
    let chat = state.chat.current();
    let tools_enabled = state.tools.definitions().len();

    Json(StatusResponse {
        running: true,
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        pid: std::process::id(),
        log_level,
        tools_registered: state.tools.len(),
        tools_enabled,
        chat_messages: chat.len(),
        chat_version: chat.version,
        search_roots: state
            .search
            .roots()
            .iter()
            .map(|r| r.display().to_string())
            .collect(),
        search: state.search.status(),
    })
}

async fn handle_stop(State(state): State<Arc<IpcState>>) -> Json<StopResponse> {
    info!("Stop requested via IPC");
    let _ = state.shutdown_tx.send(ShutdownSignal);
    Json(StopResponse {
        acknowledged: true,
        message: "Shutdown initiated".to_string(),
    })
}

async fn handle_config(State(state): State<Arc<IpcState>>) -> Result<Json<ConfigResponse>, ApiError> {
    let config = state.config.borrow().clone();
    toml::to_string_pretty(&config)
        .map(|toml| Json(ConfigResponse { toml }))
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize config: {e}"),
            )
        })
}

async fn handle_logs(
    State(state): State<Arc<IpcState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let min_level = match query.level.as_deref() {
        Some(level) => Some(level.parse::<tracing::Level>().map_err(|_| {
            api_error(StatusCode::BAD_REQUEST, format!("unknown log level: {level}"))
        })?),
        None => None,
    };
    let Some(reader) = &state.logs else {
        return Ok(Json(LogsResponse {
            entries: Vec::new(),
            total: 0,
        }));
    };
    Ok(Json(LogsResponse {
        entries: reader.recent(query.limit.unwrap_or(DEFAULT_LOG_LIMIT), min_level),
        total: reader.len(),
    }))
}

async fn handle_tools(State(state): State<Arc<IpcState>>) -> Json<ToolsResponse> {
    let tools = state
        .tools
        .names()
        .iter()
        .filter_map(|name| state.tools.get(name))
        .map(|t| ToolInfo {
            name: t.definition.name.clone(),
            description: t.definition.description.clone(),
            tags: t.tags.clone(),
            enabled: t.enabled,
            parameters: t.definition.parameters.clone(),
        })
        .collect();
    Json(ToolsResponse { tools })
}

async fn handle_invoke(
    State(state): State<Arc<IpcState>>,
    Json(req): Json<InvokeToolRequest>,
) -> Result<Json<ToolResult>, ApiError> {
    info!(tool = %req.name, "Tool invocation requested via IPC");
    match state
        .tools
        .invoke(&req.name, req.args, state.chat.clone())
        .await
    {
        Ok(result) => Ok(Json(result)),
        Err(ToolError::NotFound(name)) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("tool not found: {name}"),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn handle_history(State(state): State<Arc<IpcState>>) -> Json<ChatHistoryResponse> {
    let chat = state.chat.current();
    Json(ChatHistoryResponse {
        version: chat.version,
        messages: chat.history.clone(),
    })
}

async fn handle_turn(
    State(state): State<Arc<IpcState>>,
    Json(req): Json<ChatTurnRequest>,
) -> Result<Json<ChatTurnResponse>, ApiError> {
    let turn = ChatTurn::new(state.chat.clone(), Arc::clone(&state.tools));
    if let Some(text) = req.message {
        turn.user_message(text)
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }
    let outcomes = turn.run_tool_calls(req.calls).await;
    let chat = turn.finish();
    Ok(Json(ChatTurnResponse {
        outcomes,
        version: chat.version,
        messages: chat.len(),
    }))
}

async fn handle_search(
    State(state): State<Arc<IpcState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    if query.q.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }
    let options = SearchOptions {
        limit: Some(query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)),
        prefix: query.prefix.unwrap_or(true),
    };
    let hits = state.search.search(&query.q, &options).await;
    Ok(Json(SearchResponse {
        query: query.q,
        hits,
    }))
}

async fn handle_rebuild(State(state): State<Arc<IpcState>>) -> Json<RebuildResponse> {
    warn!("Search index rebuild requested via IPC");
    let summary = state.search.rebuild().await;
    Json(RebuildResponse {
        summary,
        search: state.search.status(),
    })
}
