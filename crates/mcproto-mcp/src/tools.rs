//! Tool registry: named handlers with their advertised definitions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::protocol::{CallToolResult, ToolDefinition};

type Handler = Arc<dyn Fn(&HashMap<String, Value>) -> CallToolResult + Send + Sync>;

struct Tool {
    definition: ToolDefinition,
    handler: Handler,
}

/// Tools served by an [`McpServer`](crate::McpServer), in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later tool with the same name replaces the earlier one.
    pub fn register<F>(mut self, definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> CallToolResult + Send + Sync + 'static,
    {
        let tool = Tool {
            definition,
            handler: Arc::new(handler),
        };
        match self
            .tools
            .iter_mut()
            .find(|t| t.definition.name == tool.definition.name)
        {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Names of all registered tools, as published in a server descriptor.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.definition.name.clone()).collect()
    }

    pub fn execute(&self, name: &str, arguments: &HashMap<String, Value>) -> CallToolResult {
        match self.tools.iter().find(|t| t.definition.name == name) {
            Some(tool) => (tool.handler)(arguments),
            None => CallToolResult::error(format!("Unknown tool: {}", name)),
        }
    }
}
