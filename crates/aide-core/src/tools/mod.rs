//! Tools callable from a chat turn.
//!
//! - [`wrapper`]: transcript bookkeeping around any [`Tool`].
//! - [`registry`]: named tool definitions and their backends.
//! - [`file_search`]: the local document search tool.

pub mod file_search;
pub mod registry;
pub mod wrapper;

pub use file_search::{FILE_SEARCH_TOOL, FileSearchTool};
pub use registry::{RegisteredTool, ToolDefinition, ToolRegistry};
pub use wrapper::{
    FnTool, Tool, ToolError, ToolOutcome, ToolOutput, ToolResult, WrappedTool, tool_fn, wrap_tool,
};
