//! Tools offered to the model

pub mod mcp;

pub use mcp::McpTool;

use async_trait::async_trait;
use catalyst_mcp::{McpClient, ToolInfo};
use catalyst_provider::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;

type BoxedTool = Box<dyn ToolTrait + Send + Sync>;

/// A capability the model can invoke by name
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the accepted arguments
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<String>;
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

/// Tools by name, remembering registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `McpTool` per descriptor, all sharing `client`
    pub fn from_mcp(client: Arc<McpClient>, descriptors: Vec<ToolInfo>) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(McpTool::new(descriptor, Arc::clone(&client)));
        }
        registry
    }

    /// Add a tool; a tool with the same name is replaced in place
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Box::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&(dyn ToolTrait + Send + Sync)> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declarations for the model, in registration order
    pub fn definitions(&self) -> Vec<Tool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| to_provider_tool(t.as_ref()))
            .collect()
    }

    /// Run `name`; `None` when no such tool is registered
    pub async fn execute(&self, name: &str, args: Value) -> Option<Result<String>> {
        let tool = self.tools.get(name)?;
        Some(tool.execute(args).await)
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
