//! Chat transcript model, the store that owns the current transcript, and
//! the turn driver that runs tool calls against it.

pub mod message;
pub mod store;
pub mod turn;

pub use message::{
    ChatContext, ChatMessage, MessageId, MessageKind, ReferenceType, ResourceReference,
    ToolResultRecord, ToolResultType,
};
pub use store::{ChatContextHandle, ChatContextStore, ContextError};
pub use turn::{ChatTurn, ToolCall, ToolCallOutcome};
