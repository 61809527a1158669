//! Tool registry: tool definitions offered to the model and their backends.
//!
//! Every registered tool has a name, description, JSON Schema for its
//! parameters, tags for scoping, and the [`Tool`] that executes it. Calls go
//! through [`wrap_tool`] so each one leaves a message in the chat transcript.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use aide_config::ToolsConfig;

use super::wrapper::{Tool, ToolError, ToolResult, WrappedTool, wrap_tool};
use crate::chat::ChatContextHandle;

/// A tool as described to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (e.g. "file_search").
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub parameters: serde_json::Value,
}

/// A registered tool with metadata.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub tool: Arc<dyn Tool>,
    /// Tags for scoping (e.g. "search", "file", "media").
    pub tags: Vec<String>,
    /// Disabled tools are neither offered nor invocable.
    pub enabled: bool,
}

/// Registry of all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any previous tool of the same name.
    pub fn register(&mut self, definition: ToolDefinition, tool: Arc<dyn Tool>, tags: &[&str]) {
        debug!(tool = %definition.name, "Registering tool");
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                tool,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                enabled: true,
            },
        );
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every enabled tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.scoped_definitions(None)
    }

    /// Definitions of enabled tools carrying at least one of `tags`.
    pub fn scoped_definitions(&self, tags: Option<&[&str]>) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .filter(|t| t.enabled)
            .filter(|t| match tags {
                Some(required) => required.iter().any(|tag| t.tags.iter().any(|tt| tt == tag)),
                None => true,
            })
            .map(|t| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Enable or disable a tool. Returns `false` if no such tool exists.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tools.get_mut(name) {
            Some(tool) => {
                tool.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Disable the tools listed in the `[tools]` config section.
    pub fn apply_config(&mut self, config: &ToolsConfig) {
        for name in &config.disabled {
            if self.set_enabled(name, false) {
                info!(tool = %name, "Tool disabled by configuration");
            } else {
                debug!(tool = %name, "Configured tool to disable is not registered");
            }
        }
    }

    /// Bind an enabled tool to a chat context.
    pub fn wrap(&self, name: &str, context: ChatContextHandle) -> Result<WrappedTool, ToolError> {
        match self.tools.get(name) {
            Some(registered) if registered.enabled => {
                Ok(wrap_tool(name, Arc::clone(&registered.tool), context))
            }
            _ => Err(ToolError::NotFound(name.to_string())),
        }
    }

    /// Invoke a tool by name against `context`.
    ///
    /// Unknown or disabled tools fail with [`ToolError::NotFound`] and leave
    /// the transcript untouched. Anything else resolves to a [`ToolResult`].
    pub async fn invoke(
        &self,
        name: &str,
        input: serde_json::Value,
        context: ChatContextHandle,
    ) -> Result<ToolResult, ToolError> {
        let wrapped = self.wrap(name, context)?;
        Ok(wrapped.invoke(input).await)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
