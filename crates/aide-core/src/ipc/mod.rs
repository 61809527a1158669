//! Daemon IPC: an HTTP/JSON API over a Unix domain socket.
//!
//! The daemon serves the API; the CLI connects as a client to query status,
//! run searches, invoke tools against the session transcript, and request
//! shutdown.
//!
//! ```text
//! ┌──────────┐        Unix socket        ┌──────────────┐
//! │   CLI    │──────────────────────────▶│  IPC server  │
//! └──────────┘     HTTP/1.1 + JSON       │   (axum)     │
//!                                        └──────┬───────┘
//!                          ┌────────────────────┼────────────────────┐
//!                   ┌──────▼──────┐      ┌──────▼──────┐      ┌──────▼──────┐
//!                   │ Tool        │      │ Chat        │      │ Search      │
//!                   │ registry    │─────▶│ context     │      │ engine      │
//!                   └─────────────┘      └─────────────┘      └─────────────┘
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::{IpcClient, IpcClientError};
pub use server::{DEFAULT_SOCKET_PATH, IpcState, socket_path_from_config};
pub use types::*;
