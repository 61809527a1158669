#![deny(unsafe_code)]

//! aide core runtime.
//!
//! The chat-aware tool pipeline and the local file search index behind it:
//! tools are wrapped so every call leaves a pending-then-finished message in
//! the chat transcript, and the file search tool queries a persisted
//! full-text index over the user's documents. The daemon serves both to the
//! CLI over a Unix socket.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future: the return type for async
/// trait methods that need dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits produces opaque return types that are not
/// object-safe, so traits used as `Arc<dyn Trait>` return this instead.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Chat transcript model, context store, and chat turns.
pub mod chat;
/// Async daemon runtime.
pub mod daemon;
/// Unix socket IPC between daemon and CLI.
pub mod ipc;
/// In-memory log collector backing `GET /logs`.
pub mod logging;
/// Full-text file search index, snapshots, and the indexing pipeline.
pub mod search;
/// Tool wrapper, registry, and built-in tools.
pub mod tools;

pub use chat::{ChatContext, ChatContextHandle, ChatContextStore, ChatMessage, ChatTurn};
pub use daemon::Daemon;
pub use logging::{LogCollector, LogReader};
pub use search::SearchEngine;
pub use tools::{Tool, ToolRegistry, ToolResult, wrap_tool};
