//! The `file_search` tool: full-text search over the user's local documents.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::registry::{ToolDefinition, ToolRegistry};
use super::wrapper::{Tool, ToolError, ToolOutput};
use crate::BoxFuture;
use crate::chat::ResourceReference;
use crate::search::{SearchEngine, SearchHit, SearchOptions};

pub const FILE_SEARCH_TOOL: &str = "file_search";

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;
/// Characters of context kept on each side of a match in snippets.
const SNIPPET_RADIUS: usize = 80;

#[derive(Debug, Deserialize)]
struct FileSearchInput {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// Searches the local file index and links each match.
pub struct FileSearchTool {
    engine: Arc<SearchEngine>,
    default_limit: usize,
}

impl FileSearchTool {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self {
            engine,
            default_limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: FILE_SEARCH_TOOL.to_string(),
            description: "Search the user's local documents (text, office files, PDFs) by \
                          content and file name."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Words to look for"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LIMIT,
                        "description": "Maximum number of files to return"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Register under [`FILE_SEARCH_TOOL`].
    pub fn register(self, registry: &mut ToolRegistry) {
        registry.register(Self::definition(), Arc::new(self), &["search", "file"]);
    }

    async fn run(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let input: FileSearchInput =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        let query = input.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidInput("query must not be empty".to_string()));
        }
        let limit = input
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_LIMIT);

        let hits = self
            .engine
            .search(
                query,
                &SearchOptions {
                    limit: Some(limit),
                    prefix: true,
                },
            )
            .await;
        debug!(query, hits = hits.len(), "File search finished");

        if hits.is_empty() {
            return Ok(ToolOutput::text(format!("No files matched \"{query}\".")));
        }

        let mut text = format!(
            "Found {} file{} matching \"{query}\":",
            hits.len(),
            if hits.len() == 1 { "" } else { "s" }
        );
        let mut output = ToolOutput::default();
        for (rank, hit) in hits.iter().enumerate() {
            text.push_str(&format!("\n{}. {} ({})", rank + 1, hit.title, hit.id));
            output.references.push(reference_for(hit).await);
        }
        output.text = text;
        Ok(output)
    }
}

impl Tool for FileSearchTool {
    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput, ToolError>> {
        Box::pin(self.run(input))
    }
}

async fn reference_for(hit: &SearchHit) -> ResourceReference {
    let mut reference = ResourceReference::new(hit.title.clone())
        .with_link(file_link(Path::new(&hit.id)))
        .with_metadata(serde_json::json!({
            "path": hit.id,
            "score": hit.score,
            "category": hit.category,
        }));

    // The file may have changed or vanished since it was indexed.
    match tokio::fs::read(&hit.id).await {
        Ok(bytes) => {
            let content = String::from_utf8_lossy(&bytes);
            if let Some(snippet) = snippet(&content, &hit.matched_terms) {
                reference = reference.with_snippet(snippet);
            }
        }
        Err(e) => debug!(path = %hit.id, error = %e, "No snippet for search hit"),
    }
    reference
}

fn file_link(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{path}")
    } else {
        format!("file:///{path}")
    }
}

/// An excerpt around the first matched term, or the start of the text.
fn snippet(content: &str, terms: &[String]) -> Option<String> {
    if content.trim().is_empty() {
        return None;
    }
    let (start, end) = match terms.iter().find_map(|t| find_term(content, t)) {
        Some((at, len)) => (
            floor_boundary(content, at.saturating_sub(SNIPPET_RADIUS)),
            ceil_boundary(content, at + len + SNIPPET_RADIUS),
        ),
        None => (0, ceil_boundary(content, 2 * SNIPPET_RADIUS)),
    };

    let mut excerpt = content[start..end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if start > 0 {
        excerpt.insert_str(0, "...");
    }
    if end < content.len() {
        excerpt.push_str("...");
    }
    Some(excerpt)
}

/// Byte offset and length of the first case-insensitive occurrence of `term`.
fn find_term(content: &str, term: &str) -> Option<(usize, usize)> {
    if term.is_empty() {
        return None;
    }
    let lower = content.to_lowercase();
    if lower.len() == content.len()
        && let Some(at) = lower.find(term)
        && content.is_char_boundary(at)
        && content.is_char_boundary(at + term.len())
    {
        return Some((at, term.len()));
    }
    content
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| {
            content
                .get(i..i + term.len())
                .is_some_and(|s| s.to_lowercase() == term)
        })
        .map(|at| (at, term.len()))
}

fn floor_boundary(s: &str, mut at: usize) -> usize {
    at = at.min(s.len());
    while !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

fn ceil_boundary(s: &str, mut at: usize) -> usize {
    at = at.min(s.len());
    while !s.is_char_boundary(at) {
        at += 1;
    }
    at
}
