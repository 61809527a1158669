//! Tool invocation wrapper.
//!
//! [`wrap_tool`] turns any [`Tool`] into a chat-aware operation. Each call
//! appends a pending tool message to the chat context, runs the tool, and
//! replaces that same message (found by id) with a finished copy holding the
//! result. A failing or panicking tool never surfaces as an error to the
//! caller: the failure becomes the result text instead, so it stays visible
//! in the transcript.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::BoxFuture;
use crate::chat::{ChatContextHandle, ChatMessage, MessageId, ResourceReference};

/// What a tool produces on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub text: String,
    #[serde(default)]
    pub references: Vec<ResourceReference>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            references: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: ResourceReference) -> Self {
        self.references.push(reference);
        self
    }
}

/// Errors a tool can raise.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Execution(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// An asynchronous tool backend.
///
/// Uses [`BoxFuture`] so tools can be stored as `Arc<dyn Tool>`.
pub trait Tool: Send + Sync {
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput, ToolError>>;
}

/// A [`Tool`] backed by an async closure. See [`tool_fn`].
pub struct FnTool<F>(F);

impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput, ToolError>> {
        Box::pin((self.0)(input))
    }
}

/// Build a tool from an async closure.
///
/// ```ignore
/// let echo = tool_fn(|input| async move {
///     Ok(ToolOutput::text(input.to_string()))
/// });
/// ```
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn Tool>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    Arc::new(FnTool(f))
}

/// How a tool call settled.
#[derive(Debug)]
pub enum ToolOutcome {
    Succeeded(ToolOutput),
    Failed(ToolError),
}

impl ToolOutcome {
    /// Flatten into the caller-facing result. Failures become display text;
    /// the original error is kept in [`ToolResult::failure`].
    pub fn into_result(self, tool_id: &str, message_id: MessageId, elapsed: Duration) -> ToolResult {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match self {
            ToolOutcome::Succeeded(output) => ToolResult {
                text: output.text,
                references: output.references,
                message_id,
                elapsed_ms,
                failure: None,
            },
            ToolOutcome::Failed(err) => ToolResult {
                text: format!("Tool {tool_id} failed: {err}"),
                references: Vec::new(),
                message_id,
                elapsed_ms,
                failure: Some(format!("{err:?}")),
            },
        }
    }
}

/// The value a wrapped tool call resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub text: String,
    #[serde(default)]
    pub references: Vec<ResourceReference>,
    /// Id of the transcript message this call created.
    pub message_id: MessageId,
    pub elapsed_ms: u64,
    /// Diagnostic detail of a contained failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ToolResult {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// A tool bound to a chat context.
#[derive(Clone)]
pub struct WrappedTool {
    tool_id: Arc<str>,
    tool: Arc<dyn Tool>,
    context: ChatContextHandle,
}

/// Bind `tool` to `context` under the name `tool_id`.
pub fn wrap_tool(
    tool_id: impl Into<String>,
    tool: Arc<dyn Tool>,
    context: ChatContextHandle,
) -> WrappedTool {
    WrappedTool {
        tool_id: Arc::from(tool_id.into()),
        tool,
        context,
    }
}

impl WrappedTool {
    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    /// Run the tool with transcript bookkeeping. Never fails.
    ///
    /// The append, the tool run and the finish step all happen on one
    /// spawned task. Dropping the returned future detaches that task, so the
    /// pending message is still finished once the tool returns.
    pub async fn invoke(&self, input: serde_json::Value) -> ToolResult {
        let message_id = MessageId::new();
        let span = info_span!("tool.invoke", tool = %self.tool_id, message_id = %message_id);
        let settle = settle(
            Arc::clone(&self.tool_id),
            Arc::clone(&self.tool),
            self.context.clone(),
            message_id,
            input,
        )
        .instrument(span);

        match tokio::spawn(settle).await {
            Ok(result) => result,
            Err(join) => {
                error!(tool = %self.tool_id, error = %join, "Tool settle task failed");
                ToolOutcome::Failed(ToolError::Execution(join.to_string())).into_result(
                    &self.tool_id,
                    message_id,
                    Duration::ZERO,
                )
            }
        }
    }
}

async fn settle(
    tool_id: Arc<str>,
    tool: Arc<dyn Tool>,
    context: ChatContextHandle,
    message_id: MessageId,
    input: serde_json::Value,
) -> ToolResult {
    let pending = ChatMessage::pending_tool(message_id, &tool_id);
    if let Err(e) = context.update(move |ctx| ctx.with_appended(pending)).await {
        error!(error = %e, "Failed to record pending tool message");
    }

    let started = Instant::now();
    let outcome = execute_contained(tool, input.clone()).await;
    let elapsed = started.elapsed();

    if let ToolOutcome::Failed(err) = &outcome {
        warn!(error = %err, "Tool failed");
    }
    let result = outcome.into_result(&tool_id, message_id, elapsed);
    debug!(elapsed_ms = result.elapsed_ms, "Tool settled");

    let recorded = result.clone();
    let finish = move |ctx: &crate::chat::ChatContext| {
        ctx.with_replaced(message_id, |message| {
            message.finish_tool(&tool_id, recorded, input)
        })
        .unwrap_or_else(|| {
            warn!(%message_id, "Pending tool message vanished before completion");
            ctx.clone()
        })
    };
    if let Err(e) = context.update(finish).await {
        error!(error = %e, "Failed to record finished tool message");
    }

    result
}

/// Run the tool on its own task so a panic is reported like an error.
async fn execute_contained(tool: Arc<dyn Tool>, input: serde_json::Value) -> ToolOutcome {
    let task = tokio::spawn(async move { tool.execute(input).await });
    match task.await {
        Ok(Ok(output)) => ToolOutcome::Succeeded(output),
        Ok(Err(err)) => ToolOutcome::Failed(err),
        Err(join) if join.is_panic() => {
            let payload = join.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ToolOutcome::Failed(ToolError::Panicked(message))
        }
        Err(join) => ToolOutcome::Failed(ToolError::Execution(join.to_string())),
    }
}

impl std::fmt::Debug for WrappedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedTool")
            .field("tool_id", &self.tool_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatContext, ChatContextStore, MessageKind, ToolResultRecord};
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    fn ok_tool(text: &'static str) -> Arc<dyn Tool> {
        tool_fn(move |_input| async move { Ok(ToolOutput::text(text)) })
    }

    #[tokio::test]
    async fn test_invoke_appends_and_finishes_one_message() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let wrapped = wrap_tool("t1", ok_tool("ok"), ctx.clone());

        let result = wrapped.invoke(serde_json::json!({})).await;

        assert_eq!(result.text, "ok");
        assert!(!result.is_failure());
        let history = &ctx.current().history;
        assert_eq!(history.len(), 1);
        let msg = &history[0];
        assert_eq!(msg.id, result.message_id);
        assert_eq!(msg.kind, MessageKind::Tool);
        assert!(msg.finished);
        assert_eq!(msg.text, "ok");
    }

    #[tokio::test]
    async fn test_failure_is_contained() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let failing = tool_fn(|_input| async move {
            Err::<ToolOutput, _>(ToolError::Execution("boom".to_string()))
        });
        let wrapped = wrap_tool("t2", failing, ctx.clone());

        let result = wrapped.invoke(serde_json::json!({})).await;

        assert_eq!(result.text, "Tool t2 failed: boom");
        assert!(result.is_failure());
        assert!(result.failure.as_deref().unwrap().contains("boom"));
        let msg = &ctx.current().history[0];
        assert!(msg.finished);
        assert!(msg.text.contains("t2"));
        assert!(msg.text.contains("boom"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let panicking = tool_fn(|_input| async move {
            if true {
                panic!("kaboom");
            }
            Ok(ToolOutput::default())
        });
        let wrapped = wrap_tool("explodes", panicking, ctx.clone());

        let result = wrapped.invoke(serde_json::json!({})).await;

        assert!(result.text.starts_with("Tool explodes failed:"));
        assert!(result.text.contains("kaboom"));
        assert!(ctx.current().history[0].finished);
    }

    #[tokio::test]
    async fn test_pending_message_visible_while_running() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let started_tx = std::sync::Mutex::new(Some(started_tx));
        let release_rx = std::sync::Mutex::new(Some(release_rx));

        let gated = tool_fn(move |_input| {
            let started = started_tx.lock().unwrap().take();
            let release = release_rx.lock().unwrap().take();
            async move {
                if let Some(tx) = started {
                    let _ = tx.send(());
                }
                if let Some(rx) = release {
                    let _ = rx.await;
                }
                Ok(ToolOutput::text("released"))
            }
        });
        let wrapped = wrap_tool("gated", gated, ctx.clone());
        let call = tokio::spawn(async move { wrapped.invoke(serde_json::json!({"a": 1})).await });

        started_rx.await.unwrap();
        {
            let snapshot = ctx.current();
            assert_eq!(snapshot.len(), 1);
            let msg = &snapshot.history[0];
            assert!(!msg.finished);
            assert_eq!(msg.text, "Calling tool gated");
        }

        release_tx.send(()).unwrap();
        let result = call.await.unwrap();
        let snapshot = ctx.current();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.history[0].id, result.message_id);
        assert!(snapshot.history[0].finished);
    }

    #[tokio::test]
    async fn test_other_messages_untouched() {
        let before = ChatMessage::text("before");
        let ctx = ChatContextStore::spawn(ChatContext::new(vec![before.clone()]));
        let wrapped = wrap_tool("t", ok_tool("done"), ctx.clone());

        wrapped.invoke(serde_json::json!({})).await;

        let snapshot = ctx.current();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.history[0], before);
    }

    #[tokio::test]
    async fn test_finished_record_carries_args_and_result() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let wrapped = wrap_tool("echo", ok_tool("echoed"), ctx.clone());
        let args = serde_json::json!({"query": "taxes"});

        let result = wrapped.invoke(args.clone()).await;

        match &ctx.current().history[0].tool_result {
            Some(ToolResultRecord::Finished {
                tool_name,
                result: recorded,
                args: recorded_args,
                ..
            }) => {
                assert_eq!(tool_name, "echo");
                assert_eq!(recorded, &result);
                assert_eq!(recorded_args, &args);
            }
            other => panic!("expected finished record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_references_copied_to_message() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let tool = tool_fn(|_input| async move {
            Ok(ToolOutput::text("one file")
                .with_reference(ResourceReference::new("a.txt").with_link("file:///a.txt")))
        });
        let wrapped = wrap_tool("refs", tool, ctx.clone());

        let result = wrapped.invoke(serde_json::json!({})).await;

        assert_eq!(result.references.len(), 1);
        assert_eq!(ctx.current().history[0].references, result.references);
    }

    #[tokio::test]
    async fn test_two_concurrent_invocations_keep_both_messages() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let slow = tool_fn(|_input| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(ToolOutput::text("slow"))
        });
        let fast = wrap_tool("fast", ok_tool("fast"), ctx.clone());
        let slow = wrap_tool("slow", slow, ctx.clone());

        let (a, b) = tokio::join!(
            slow.invoke(serde_json::json!({})),
            fast.invoke(serde_json::json!({}))
        );

        let snapshot = ctx.current();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.history.iter().all(|m| m.finished));
        assert!(snapshot.find(a.message_id).is_some());
        assert!(snapshot.find(b.message_id).is_some());
        // append + finish per call
        assert_eq!(snapshot.version, 4);
    }

    #[tokio::test]
    async fn test_dropped_caller_still_finishes_message() {
        let ctx = ChatContextStore::spawn(ChatContext::default());
        let slow = tool_fn(|_input| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ToolOutput::text("late"))
        });
        let wrapped = wrap_tool("slow", slow, ctx.clone());

        let cut_short =
            tokio::time::timeout(Duration::from_millis(10), wrapped.invoke(serde_json::json!({})))
                .await;
        assert!(cut_short.is_err());

        let mut updates = ctx.subscribe();
        let settled = tokio::time::timeout(
            Duration::from_secs(2),
            updates.wait_for(|c| c.len() == 1 && c.pending_tools().next().is_none()),
        )
        .await
        .is_ok_and(|r| r.is_ok());
        assert!(settled, "tool message left pending");

        let snapshot = ctx.current();
        assert_eq!(snapshot.history[0].text, "late");
        assert_eq!(snapshot.version, 2);
    }

    #[test]
    fn test_outcome_into_result() {
        let id = MessageId::new();
        let ok = ToolOutcome::Succeeded(ToolOutput::text("fine"))
            .into_result("t", id, Duration::from_millis(12));
        assert_eq!(ok.text, "fine");
        assert_eq!(ok.elapsed_ms, 12);
        assert_eq!(ok.message_id, id);

        let failed = ToolOutcome::Failed(ToolError::InvalidInput("missing query".into()))
            .into_result("search", id, Duration::ZERO);
        assert_eq!(failed.text, "Tool search failed: invalid input: missing query");
        assert!(failed.references.is_empty());
    }
}
