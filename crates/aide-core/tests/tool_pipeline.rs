//! End-to-end tests of the chat-aware tool pipeline through the public API.

use std::sync::Arc;
use std::time::Duration;

use aide_core::chat::{
    ChatContext, ChatContextStore, ChatTurn, MessageKind, ToolCall, ToolResultRecord,
};
use aide_core::search::SearchEngine;
use aide_core::tools::{
    FILE_SEARCH_TOOL, FileSearchTool, ToolError, ToolOutput, ToolRegistry, tool_fn, wrap_tool,
};
use aide_test_utils::TestTree;
use pretty_assertions::assert_eq;

// ── Wrapper lifecycle ──────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn successful_call_leaves_one_finished_message() {
    let ctx = ChatContextStore::spawn(ChatContext::default());
    let invoke = wrap_tool(
        "t1",
        tool_fn(|_| async { Ok(ToolOutput::text("ok")) }),
        ctx.clone(),
    );

    let result = invoke.invoke(serde_json::json!({})).await;

    let transcript = ctx.current();
    assert_eq!(transcript.len(), 1);
    let message = &transcript.history[0];
    assert!(message.finished);
    assert_eq!(message.text, "ok");
    assert_eq!(message.id, result.message_id);
    assert_eq!(message.kind, MessageKind::Tool);
}

#[test_log::test(tokio::test)]
async fn failing_call_resolves_with_failure_text() {
    let ctx = ChatContextStore::spawn(ChatContext::default());
    let invoke = wrap_tool(
        "t2",
        tool_fn(|_| async { Err::<ToolOutput, _>(ToolError::Execution("boom".to_string())) }),
        ctx.clone(),
    );

    let result = invoke.invoke(serde_json::json!({})).await;

    assert!(result.text.contains("t2"));
    assert!(result.text.contains("boom"));
    let message = &ctx.current().history[0];
    assert!(message.finished);
    assert_eq!(message.text, result.text);
}

#[test_log::test(tokio::test)]
async fn concurrent_calls_lose_no_messages() {
    let ctx = ChatContextStore::spawn(ChatContext::default());
    let slow = wrap_tool(
        "slow",
        tool_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(ToolOutput::text("slow done"))
        }),
        ctx.clone(),
    );
    let fast = wrap_tool(
        "fast",
        tool_fn(|_| async { Ok(ToolOutput::text("fast done")) }),
        ctx.clone(),
    );

    let (a, b) = tokio::join!(
        slow.invoke(serde_json::json!({})),
        fast.invoke(serde_json::json!({}))
    );

    let transcript = ctx.current();
    // Two appends and two replaces, all applied.
    assert_eq!(transcript.version, 4);
    assert_eq!(transcript.len(), 2);
    for result in [&a, &b] {
        let message = transcript.find(result.message_id).unwrap();
        assert!(message.finished);
        assert_eq!(message.text, result.text);
    }
}

#[test_log::test(tokio::test)]
async fn finished_message_serializes_in_wire_shape() {
    let ctx = ChatContextStore::spawn(ChatContext::default());
    let invoke = wrap_tool(
        "t1",
        tool_fn(|_| async { Ok(ToolOutput::text("ok")) }),
        ctx.clone(),
    );
    invoke.invoke(serde_json::json!({"q": 1})).await;

    let json = serde_json::to_value(&ctx.current().history[0]).unwrap();
    assert_eq!(json["type"], "tool");
    assert_eq!(json["finished"], true);
    assert_eq!(json["toolResult"]["toolName"], "t1");
    assert_eq!(json["toolResult"]["type"], "tool-result");
    assert_eq!(json["toolResult"]["args"], serde_json::json!({"q": 1}));
    assert!(json["toolResult"]["toolCallId"].is_string());
}

// ── File search through the registry ──────────────────────────────

fn file_search_registry(tree: &TestTree) -> Arc<ToolRegistry> {
    let engine = Arc::new(SearchEngine::new(
        vec![tree.path().join("home")],
        tree.path().join("index.json"),
    ));
    let mut registry = ToolRegistry::new();
    FileSearchTool::new(engine).register(&mut registry);
    Arc::new(registry)
}

#[test_log::test(tokio::test)]
async fn file_search_results_land_in_transcript() {
    let tree = TestTree::new();
    tree.file("home/Documents/lease.pdf", "Residential lease agreement, rent due monthly");
    tree.file("home/Documents/notes.txt", "Call the landlord about the lease renewal");
    tree.file("home/Downloads/song.mp3", "lease lease lease");

    let turn = ChatTurn::begin(ChatContext::default(), file_search_registry(&tree));
    turn.user_message("where is my lease?").await.unwrap();
    let outcomes = turn
        .run_tool_calls(vec![ToolCall {
            id: "call-1".to_string(),
            name: FILE_SEARCH_TOOL.to_string(),
            arguments: serde_json::json!({"query": "lease"}),
        }])
        .await;

    let result = outcomes[0].result.as_ref().unwrap();
    assert!(!result.is_failure());
    let mut names: Vec<_> = result.references.iter().map(|r| r.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["lease.pdf", "notes.txt"]);

    let transcript = turn.finish();
    assert_eq!(transcript.len(), 2);
    let tool_message = &transcript.history[1];
    assert_eq!(tool_message.references, result.references);
    match &tool_message.tool_result {
        Some(ToolResultRecord::Finished { tool_name, .. }) => {
            assert_eq!(tool_name, FILE_SEARCH_TOOL)
        }
        other => panic!("expected finished record, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn bad_file_search_input_is_contained() {
    let tree = TestTree::new();
    let registry = file_search_registry(&tree);
    let ctx = ChatContextStore::spawn(ChatContext::default());

    let result = registry
        .invoke(FILE_SEARCH_TOOL, serde_json::json!({"query": 42}), ctx.clone())
        .await
        .unwrap();

    assert!(result.is_failure());
    assert!(result.text.starts_with("Tool file_search failed:"));
    assert!(ctx.current().history[0].finished);
}
