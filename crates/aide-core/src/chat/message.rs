//! Chat transcript types.
//!
//! A transcript is an ordered list of [`ChatMessage`]s held in a
//! [`ChatContext`]. Tool invocations show up in the transcript as `tool`
//! messages that start out pending and are later replaced, by id, with a
//! finished copy carrying the tool's result.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::ToolResult;

/// Opaque, never-reused message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Variant tag of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Tool,
}

/// Marker serialized as `"type": "resource-reference"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceType {
    #[default]
    #[serde(rename = "resource-reference")]
    ResourceReference,
}

/// A resource a tool result points at (a file, a web page, a track).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    #[serde(rename = "type", default)]
    pub kind: ReferenceType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ResourceReference {
    /// A reference with only a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            kind: ReferenceType::ResourceReference,
            name: name.into(),
            link: None,
            snippet: None,
            image_url: None,
            metadata: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Marker serialized as `"type": "tool-result"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolResultType {
    #[default]
    #[serde(rename = "tool-result")]
    ToolResult,
}

/// The `toolResult` payload of a tool message.
///
/// Finished is listed first so untagged deserialization prefers it; a
/// pending record has no `toolCallId` and falls through to `Pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ToolResultRecord {
    Finished {
        tool_name: String,
        tool_call_id: String,
        result: ToolResult,
        #[serde(rename = "type", default)]
        kind: ToolResultType,
        args: serde_json::Value,
    },
    Pending {
        tool_name: String,
        text: Option<String>,
        references: Vec<ResourceReference>,
    },
}

impl ToolResultRecord {
    pub fn tool_name(&self) -> &str {
        match self {
            ToolResultRecord::Finished { tool_name, .. }
            | ToolResultRecord::Pending { tool_name, .. } => tool_name,
        }
    }
}

/// One entry in a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultRecord>,
    pub finished: bool,
    /// Time of the last mutation.
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub references: Vec<ResourceReference>,
}

impl ChatMessage {
    /// A plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            kind: MessageKind::Text,
            text: text.into(),
            tool_result: None,
            finished: true,
            time: Utc::now(),
            references: Vec::new(),
        }
    }

    /// The placeholder appended before a tool runs.
    pub fn pending_tool(id: MessageId, tool_id: &str) -> Self {
        Self {
            id,
            kind: MessageKind::Tool,
            text: format!("Calling tool {tool_id}"),
            tool_result: Some(ToolResultRecord::Pending {
                tool_name: tool_id.to_string(),
                text: None,
                references: Vec::new(),
            }),
            finished: false,
            time: Utc::now(),
            references: Vec::new(),
        }
    }

    /// A finished copy of this message carrying `result`.
    ///
    /// The id and kind are kept; everything else is taken from the result.
    pub fn finish_tool(&self, tool_id: &str, result: ToolResult, args: serde_json::Value) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            text: result.text.clone(),
            references: result.references.clone(),
            tool_result: Some(ToolResultRecord::Finished {
                tool_name: tool_id.to_string(),
                tool_call_id: Uuid::new_v4().to_string(),
                result,
                kind: ToolResultType::ToolResult,
                args,
            }),
            finished: true,
            time: Utc::now(),
        }
    }

    pub fn is_tool(&self) -> bool {
        self.kind == MessageKind::Tool
    }
}

/// The transcript of one chat session.
///
/// Values are never edited in place by the pipeline. Every change derives a
/// new context from the previous one with [`with_appended`](Self::with_appended)
/// or [`with_replaced`](Self::with_replaced).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub history: Vec<ChatMessage>,
    /// Bumped on every derived value; used to detect lost updates.
    #[serde(default)]
    pub version: u64,
}

impl ChatContext {
    pub fn new(history: Vec<ChatMessage>) -> Self {
        Self {
            history,
            version: 0,
        }
    }

    /// A copy with `message` appended after all existing entries.
    pub fn with_appended(&self, message: ChatMessage) -> Self {
        let mut history = Vec::with_capacity(self.history.len() + 1);
        history.extend(self.history.iter().cloned());
        history.push(message);
        Self {
            history,
            version: self.version + 1,
        }
    }

    /// A copy where the message with `id` is replaced by `f(message)`.
    ///
    /// Returns `None` when no message has that id.
    pub fn with_replaced(
        &self,
        id: MessageId,
        f: impl FnOnce(&ChatMessage) -> ChatMessage,
    ) -> Option<Self> {
        let position = self.history.iter().position(|m| m.id == id)?;
        let mut history = self.history.clone();
        history[position] = f(&self.history[position]);
        Some(Self {
            history,
            version: self.version + 1,
        })
    }

    pub fn find(&self, id: MessageId) -> Option<&ChatMessage> {
        self.history.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Tool messages still waiting on their tool.
    pub fn pending_tools(&self) -> impl Iterator<Item = &ChatMessage> {
        self.history.iter().filter(|m| m.is_tool() && !m.finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_result(id: MessageId, text: &str) -> ToolResult {
        ToolResult {
            text: text.to_string(),
            references: vec![ResourceReference::new("notes.md").with_link("file:///notes.md")],
            message_id: id,
            elapsed_ms: 3,
            failure: None,
        }
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_pending_tool_message() {
        let id = MessageId::new();
        let msg = ChatMessage::pending_tool(id, "file_search");
        assert_eq!(msg.id, id);
        assert_eq!(msg.kind, MessageKind::Tool);
        assert_eq!(msg.text, "Calling tool file_search");
        assert!(!msg.finished);
        assert!(msg.references.is_empty());
        assert_eq!(
            msg.tool_result,
            Some(ToolResultRecord::Pending {
                tool_name: "file_search".to_string(),
                text: None,
                references: vec![],
            })
        );
    }

    #[test]
    fn test_finish_tool_keeps_identity() {
        let id = MessageId::new();
        let pending = ChatMessage::pending_tool(id, "file_search");
        let args = serde_json::json!({"query": "tax"});
        let done = pending.finish_tool("file_search", sample_result(id, "found 1"), args.clone());

        assert_eq!(done.id, id);
        assert!(done.finished);
        assert_eq!(done.text, "found 1");
        assert_eq!(done.references.len(), 1);
        assert!(done.time >= pending.time);
        match done.tool_result {
            Some(ToolResultRecord::Finished {
                tool_name,
                tool_call_id,
                args: recorded,
                ..
            }) => {
                assert_eq!(tool_name, "file_search");
                assert!(!tool_call_id.is_empty());
                assert_eq!(recorded, args);
            }
            other => panic!("expected finished record, got {other:?}"),
        }
    }

    #[test]
    fn test_with_appended_preserves_order() {
        let first = ChatMessage::text("hello");
        let second = ChatMessage::text("world");
        let ctx = ChatContext::default()
            .with_appended(first.clone())
            .with_appended(second.clone());

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.history[0].id, first.id);
        assert_eq!(ctx.history[1].id, second.id);
        assert_eq!(ctx.version, 2);
    }

    #[test]
    fn test_with_appended_leaves_original_untouched() {
        let ctx = ChatContext::new(vec![ChatMessage::text("a")]);
        let next = ctx.with_appended(ChatMessage::text("b"));
        assert_eq!(ctx.len(), 1);
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_with_replaced_by_id() {
        let id = MessageId::new();
        let before = ChatMessage::text("before");
        let after = ChatMessage::text("after");
        let ctx = ChatContext::new(vec![
            before.clone(),
            ChatMessage::pending_tool(id, "t"),
            after.clone(),
        ]);

        let next = ctx
            .with_replaced(id, |m| m.finish_tool("t", sample_result(id, "ok"), serde_json::json!({})))
            .unwrap();

        assert_eq!(next.history[0], before);
        assert_eq!(next.history[2], after);
        assert!(next.history[1].finished);
        assert_eq!(next.history[1].id, id);
        assert_eq!(next.version, ctx.version + 1);
    }

    #[test]
    fn test_with_replaced_missing_id() {
        let ctx = ChatContext::new(vec![ChatMessage::text("a")]);
        assert!(ctx.with_replaced(MessageId::new(), |m| m.clone()).is_none());
    }

    #[test]
    fn test_pending_tools_filter() {
        let id = MessageId::new();
        let ctx = ChatContext::new(vec![
            ChatMessage::text("a"),
            ChatMessage::pending_tool(id, "t"),
        ]);
        let pending: Vec<_> = ctx.pending_tools().map(|m| m.id).collect();
        assert_eq!(pending, vec![id]);
    }

    #[test]
    fn test_pending_message_wire_shape() {
        let msg = ChatMessage::pending_tool(MessageId::new(), "spotify");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "tool");
        assert_eq!(json["finished"], false);
        assert_eq!(json["toolResult"]["toolName"], "spotify");
        assert!(json["toolResult"]["text"].is_null());
        assert_eq!(json["toolResult"]["references"], serde_json::json!([]));
    }

    #[test]
    fn test_finished_message_wire_shape() {
        let id = MessageId::new();
        let msg = ChatMessage::pending_tool(id, "file_search").finish_tool(
            "file_search",
            sample_result(id, "done"),
            serde_json::json!({"query": "q"}),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["toolResult"]["type"], "tool-result");
        assert_eq!(json["toolResult"]["args"]["query"], "q");
        assert_eq!(json["references"][0]["type"], "resource-reference");
        assert_eq!(json["toolResult"]["result"]["messageId"], id.to_string());

        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_reference_optional_fields_wire_shape() {
        let reference = ResourceReference::new("cover.png")
            .with_link("file:///home/u/Pictures/cover.png")
            .with_image_url("https://cdn.example.com/cover.png");
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["imageUrl"], "https://cdn.example.com/cover.png");
        assert!(json.get("image_url").is_none());
        assert!(json.get("snippet").is_none());
        assert!(json.get("metadata").is_none());

        let back: ResourceReference = serde_json::from_value(json).unwrap();
        assert_eq!(back, reference);
    }

    #[test]
    fn test_pending_record_deserializes_as_pending() {
        let json = serde_json::json!({
            "toolName": "search",
            "text": null,
            "references": []
        });
        let record: ToolResultRecord = serde_json::from_value(json).unwrap();
        assert!(matches!(record, ToolResultRecord::Pending { .. }));
        assert_eq!(record.tool_name(), "search");
    }
}
