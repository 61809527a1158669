//! IPC client: typed calls to the daemon over its Unix domain socket,
//! speaking HTTP/1.1 through `hyper`.

use std::path::PathBuf;

use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tracing::debug;

use super::types::*;
use crate::chat::ToolCall;
use crate::tools::ToolResult;

#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to daemon socket at {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is not running (socket not found at {})", .0.display())]
    NotRunning(PathBuf),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("daemon returned error ({status}): {message}")]
    Daemon { status: u16, message: String },
}

/// Client for the daemon's IPC socket.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Whether the socket file exists, i.e. a daemon is probably running.
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    async fn request(
        &self,
        method: hyper::Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, IpcClientError> {
        if !self.daemon_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcClientError::Connect {
                path: self.socket_path.clone(),
                source: e,
            })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake::<
            _,
            http_body_util::Full<Bytes>,
        >(TokioIo::new(stream))
        .await
        .map_err(|e| IpcClientError::Request(format!("HTTP handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!(error = %e, "IPC connection error");
            }
        });

        debug!(%method, path, "IPC request");

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder
            .body(http_body_util::Full::new(
                body.map(Bytes::from).unwrap_or_default(),
            ))
            .map_err(|e| IpcClientError::Request(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| IpcClientError::Request(e.to_string()))?;
        let status = resp.status();
        let resp_body = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .map_err(|e| IpcClientError::Request(format!("failed to read response body: {e}")))?
            .to_bytes();

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&resp_body)
                .map(|e| e.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&resp_body).into_owned());
            return Err(IpcClientError::Daemon {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp_body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, IpcClientError> {
        let body = self.request(hyper::Method::GET, path, None).await?;
        parse(path, &body)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: Option<&impl serde::Serialize>,
    ) -> Result<T, IpcClientError> {
        let body = payload
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| IpcClientError::Request(format!("failed to serialize request: {e}")))?;
        let body = self.request(hyper::Method::POST, path, body).await?;
        parse(path, &body)
    }

    // ── Typed API ───────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse, IpcClientError> {
        self.get("/health").await
    }

    pub async fn status(&self) -> Result<StatusResponse, IpcClientError> {
        self.get("/status").await
    }

    pub async fn stop(&self) -> Result<StopResponse, IpcClientError> {
        self.post("/stop", None::<&()>).await
    }

    pub async fn config(&self) -> Result<ConfigResponse, IpcClientError> {
        self.get("/config").await
    }

    pub async fn logs(
        &self,
        limit: Option<usize>,
        level: Option<&str>,
    ) -> Result<LogsResponse, IpcClientError> {
        let mut params = Vec::new();
        if let Some(limit) = limit {
            params.push(format!("limit={limit}"));
        }
        if let Some(level) = level {
            params.push(format!("level={}", encode_query_value(level)));
        }
        self.get(&with_query("/logs", &params)).await
    }

    pub async fn tools(&self) -> Result<ToolsResponse, IpcClientError> {
        self.get("/tools").await
    }

    /// Invoke a tool; the call is recorded in the daemon's session transcript.
    pub async fn invoke_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolResult, IpcClientError> {
        let req = InvokeToolRequest {
            name: name.to_string(),
            args,
        };
        self.post("/tools/invoke", Some(&req)).await
    }

    pub async fn chat_history(&self) -> Result<ChatHistoryResponse, IpcClientError> {
        self.get("/chat/history").await
    }

    pub async fn chat_turn(
        &self,
        message: Option<String>,
        calls: Vec<ToolCall>,
    ) -> Result<ChatTurnResponse, IpcClientError> {
        self.post("/chat/turn", Some(&ChatTurnRequest { message, calls }))
            .await
    }

    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchResponse, IpcClientError> {
        let mut params = vec![format!("q={}", encode_query_value(query))];
        if let Some(limit) = limit {
            params.push(format!("limit={limit}"));
        }
        self.get(&with_query("/search", &params)).await
    }

    pub async fn rebuild_index(&self) -> Result<RebuildResponse, IpcClientError> {
        self.post("/search/rebuild", None::<&()>).await
    }
}

fn parse<T: DeserializeOwned>(path: &str, body: &[u8]) -> Result<T, IpcClientError> {
    serde_json::from_slice(body).map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))
}

fn with_query(path: &str, params: &[String]) -> String {
    if params.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", params.join("&"))
    }
}

/// Percent-encode a query string value.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
