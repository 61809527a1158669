//! Core daemon process: startup, shutdown, and the main loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use aide_config::AppConfig;

use crate::chat::{ChatContext, ChatContextHandle, ChatContextStore};
use crate::ipc::server::{self, IpcState};
use crate::logging::LogReader;
use crate::search::SearchEngine;
use crate::tools::{FileSearchTool, ToolRegistry};

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The aide daemon.
///
/// Owns the search engine, the tool registry, and the session transcript,
/// and serves them over IPC until shut down.
pub struct Daemon {
    config: AppConfig,
    socket_path: PathBuf,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    _shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    search: Arc<SearchEngine>,
    tools: Arc<ToolRegistry>,
    chat: ChatContextHandle,
    logs: Option<LogReader>,
}

impl Daemon {
    /// Build the daemon's components from `config`.
    ///
    /// Must be called from within a Tokio runtime: the session transcript's
    /// writer task is spawned here.
    pub fn new(config: AppConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        let search = Arc::new(SearchEngine::from_config(&config.search));

        let mut tools = ToolRegistry::new();
        FileSearchTool::new(Arc::clone(&search)).register(&mut tools);
        tools.apply_config(&config.tools);

        Self {
            socket_path: server::socket_path_from_config(&config),
            config,
            shutdown_tx,
            _shutdown_rx,
            search,
            tools: Arc::new(tools),
            chat: ChatContextStore::spawn(ChatContext::default()),
            logs: None,
        }
    }

    /// Expose captured logs through `GET /logs`.
    pub fn with_log_reader(mut self, reader: LogReader) -> Self {
        self.logs = Some(reader);
        self
    }

    /// Serve IPC until a shutdown signal or Ctrl-C.
    pub async fn run(&self) -> Result<(), DaemonError> {
        info!(
            socket = %self.socket_path.display(),
            version = %crate::build_info::version_string(),
            "aide daemon starting"
        );

        if self.config.search.warm_on_start {
            let engine = Arc::clone(&self.search);
            tokio::spawn(async move {
                let index = engine.initialize().await;
                info!(documents = index.len(), "Search index warmed");
            });
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server_shutdown = self.shutdown_tx.subscribe();
        let state = Arc::new(self.ipc_state());
        let socket_path = self.socket_path.clone();
        let mut ipc =
            tokio::spawn(async move { server::serve(&socket_path, state, server_shutdown).await });

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping daemon");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, initiating graceful shutdown");
                let _ = self.shutdown_tx.send(ShutdownSignal);
            }
            joined = &mut ipc => {
                // The server only returns early when it could not start.
                return match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!(error = %e, "IPC server failed");
                        Err(DaemonError::Io(e))
                    }
                    Err(e) => Err(DaemonError::Startup(e.to_string())),
                };
            }
        }

        match ipc.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(DaemonError::Io(e)),
            Err(e) => return Err(DaemonError::Startup(e.to_string())),
        }
        info!("Daemon stopped");
        Ok(())
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn search(&self) -> &Arc<SearchEngine> {
        &self.search
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// The session transcript.
    pub fn chat(&self) -> &ChatContextHandle {
        &self.chat
    }

    fn ipc_state(&self) -> IpcState {
        let (_, config) = watch::channel(self.config.clone());
        IpcState {
            config,
            shutdown_tx: self.shutdown_tx.clone(),
            search: Arc::clone(&self.search),
            tools: Arc::clone(&self.tools),
            chat: self.chat.clone(),
            logs: self.logs.clone(),
            started_at: Instant::now(),
        }
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon startup failed: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
