//! One chat turn: the user's message followed by the tool calls it triggered.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info_span};

use super::message::{ChatContext, ChatMessage, MessageId};
use super::store::{ChatContextHandle, ChatContextStore, ContextError};
use crate::tools::{ToolRegistry, ToolResult};

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// How one requested call went. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallOutcome {
    pub call_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    /// Set when the call never reached a tool, e.g. an unknown name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A chat turn bound to one transcript.
pub struct ChatTurn {
    context: ChatContextHandle,
    tools: Arc<ToolRegistry>,
}

impl ChatTurn {
    /// Start a turn over its own store seeded with `history`.
    pub fn begin(history: ChatContext, tools: Arc<ToolRegistry>) -> Self {
        Self::new(ChatContextStore::spawn(history), tools)
    }

    /// Start a turn over an existing store.
    pub fn new(context: ChatContextHandle, tools: Arc<ToolRegistry>) -> Self {
        Self { context, tools }
    }

    pub fn context(&self) -> &ChatContextHandle {
        &self.context
    }

    /// Append the user's text to the transcript.
    pub async fn user_message(&self, text: impl Into<String>) -> Result<MessageId, ContextError> {
        let message = ChatMessage::text(text);
        let id = message.id;
        self.context
            .update(move |ctx| ctx.with_appended(message))
            .await?;
        Ok(id)
    }

    /// Run `calls` concurrently against this turn's transcript.
    ///
    /// Outcomes come back in request order, whatever order the tools finish in.
    pub async fn run_tool_calls(&self, calls: Vec<ToolCall>) -> Vec<ToolCallOutcome> {
        let mut outcomes: Vec<Option<ToolCallOutcome>> = vec![None; calls.len()];
        let mut tasks = JoinSet::new();

        for (slot, call) in calls.iter().cloned().enumerate() {
            let tools = Arc::clone(&self.tools);
            let context = self.context.clone();
            let span = info_span!("chat.tool_call", call_id = %call.id, tool = %call.name);
            tasks.spawn(
                async move {
                    let outcome = match tools.invoke(&call.name, call.arguments, context).await {
                        Ok(result) => ToolCallOutcome {
                            call_id: call.id,
                            name: call.name,
                            result: Some(result),
                            error: None,
                        },
                        Err(e) => {
                            debug!(error = %e, "Tool call rejected");
                            ToolCallOutcome {
                                call_id: call.id,
                                name: call.name,
                                result: None,
                                error: Some(e.to_string()),
                            }
                        }
                    };
                    (slot, outcome)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => outcomes[slot] = Some(outcome),
                Err(e) => error!(error = %e, "Tool call task failed"),
            }
        }

        outcomes
            .into_iter()
            .zip(calls)
            .map(|(outcome, call)| {
                outcome.unwrap_or_else(|| ToolCallOutcome {
                    call_id: call.id,
                    name: call.name,
                    result: None,
                    error: Some("tool call task failed".to_string()),
                })
            })
            .collect()
    }

    /// End the turn and return the final transcript.
    pub fn finish(self) -> Arc<ChatContext> {
        self.context.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageKind;
    use crate::tools::{ToolDefinition, ToolError, ToolOutput, tool_fn};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn registry() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        for (name, delay_ms) in [("slow", 40u64), ("fast", 0)] {
            reg.register(
                ToolDefinition {
                    name: name.to_string(),
                    description: String::new(),
                    parameters: serde_json::json!({"type": "object"}),
                },
                tool_fn(move |input| async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(ToolOutput::text(format!("{name}:{input}")))
                }),
                &[],
            );
        }
        reg.register(
            ToolDefinition {
                name: "broken".to_string(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object"}),
            },
            tool_fn(|_| async { Err::<ToolOutput, _>(ToolError::Execution("boom".into())) }),
            &[],
        );
        Arc::new(reg)
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({"n": id}),
        }
    }

    #[tokio::test]
    async fn test_outcomes_in_request_order() {
        let turn = ChatTurn::begin(ChatContext::default(), registry());

        let outcomes = turn
            .run_tool_calls(vec![call("c1", "slow"), call("c2", "fast")])
            .await;

        let ids: Vec<_> = outcomes.iter().map(|o| o.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(outcomes[0].result.as_ref().unwrap().text, r#"slow:{"n":"c1"}"#);
        assert_eq!(outcomes[1].result.as_ref().unwrap().text, r#"fast:{"n":"c2"}"#);
    }

    #[tokio::test]
    async fn test_full_turn_transcript() {
        let turn = ChatTurn::begin(ChatContext::default(), registry());
        let user_id = turn.user_message("find my tax files").await.unwrap();

        let outcomes = turn
            .run_tool_calls(vec![call("c1", "slow"), call("c2", "broken"), call("c3", "fast")])
            .await;
        let transcript = turn.finish();

        // One user message plus one finished message per call.
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.history[0].id, user_id);
        assert_eq!(transcript.history[0].kind, MessageKind::Text);
        assert!(transcript.pending_tools().next().is_none());
        // 1 user append + 2 writes per call.
        assert_eq!(transcript.version, 7);

        let broken = outcomes[1].result.as_ref().unwrap();
        assert!(broken.is_failure());
        assert_eq!(broken.text, "Tool broken failed: boom");
        for outcome in &outcomes {
            let result = outcome.result.as_ref().unwrap();
            assert!(transcript.find(result.message_id).unwrap().finished);
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_not_recorded() {
        let turn = ChatTurn::begin(ChatContext::default(), registry());

        let outcomes = turn
            .run_tool_calls(vec![call("c1", "nope"), call("c2", "fast")])
            .await;

        assert_eq!(outcomes[0].result, None);
        assert_eq!(outcomes[0].error.as_deref(), Some("tool not found: nope"));
        assert!(outcomes[1].result.is_some());
        assert_eq!(turn.finish().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_turn_still_finishes_tool_messages() {
        let turn = ChatTurn::begin(ChatContext::default(), registry());

        let cut_short = tokio::time::timeout(
            Duration::from_millis(10),
            turn.run_tool_calls(vec![call("c1", "slow"), call("c2", "fast")]),
        )
        .await;
        assert!(cut_short.is_err());

        let mut updates = turn.context().subscribe();
        let settled = tokio::time::timeout(
            Duration::from_secs(2),
            updates.wait_for(|c| c.len() == 2 && c.pending_tools().next().is_none()),
        )
        .await
        .is_ok_and(|r| r.is_ok());
        assert!(settled, "tool messages left pending");

        let transcript = turn.finish();
        assert!(transcript.history.iter().all(|m| m.finished));
        assert_eq!(transcript.version, 4);
    }

    #[tokio::test]
    async fn test_no_calls() {
        let turn = ChatTurn::begin(ChatContext::default(), registry());
        assert!(turn.run_tool_calls(Vec::new()).await.is_empty());
        assert_eq!(turn.finish().version, 0);
    }

    #[test]
    fn test_tool_call_arguments_default() {
        let call: ToolCall = serde_json::from_str(r#"{"id": "c", "name": "fast"}"#).unwrap();
        assert_eq!(call.arguments, serde_json::Value::Null);
    }
}
