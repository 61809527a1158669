//! Request and response bodies for daemon IPC, shared by server and client.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ToolCall, ToolCallOutcome};
use crate::logging::LogEntry;
use crate::search::{AddSummary, EngineStatus, SearchHit};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
}

/// Daemon runtime status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub version: String,
    pub git_hash: String,
    pub uptime_secs: u64,
    pub pid: u32,
    pub log_level: String,
    pub tools_registered: usize,
    pub tools_enabled: usize,
    pub chat_messages: usize,
    pub chat_version: u64,
    pub search_roots: Vec<String>,
    pub search: EngineStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub acknowledged: bool,
    pub message: String,
}

/// Query string of `GET /logs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    /// Minimum level, e.g. `warn`.
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
    /// Entries held by the daemon before filtering.
    pub total: usize,
}

/// The daemon's effective configuration, as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub toml: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub enabled: bool,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// Body of `POST /tools/invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeToolRequest {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub version: u64,
    pub messages: Vec<ChatMessage>,
}

/// Body of `POST /chat/turn`: an optional user message, then tool calls
/// run concurrently against the session transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnResponse {
    pub outcomes: Vec<ToolCallOutcome>,
    pub version: u64,
    pub messages: usize,
}

/// Query string of `GET /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub prefix: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildResponse {
    pub summary: AddSummary,
    pub search: EngineStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
