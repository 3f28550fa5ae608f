//! Adapter exposing a provider tool through `ToolTrait`.

use async_trait::async_trait;
use catalyst_mcp::{McpClient, McpError, ToolInfo};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ToolTrait;
use crate::Result;

/// One tool of a live MCP session
pub struct McpTool {
    info: ToolInfo,
    client: Arc<McpClient>,
}

impl McpTool {
    pub fn new(info: ToolInfo, client: Arc<McpClient>) -> Self {
        Self { info, client }
    }

    pub fn info(&self) -> &ToolInfo {
        &self.info
    }
}

#[async_trait]
impl ToolTrait for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.info.description
    }

    fn parameters(&self) -> Value {
        self.info.input_schema.clone()
    }

    /// Tool-reported failures come back as text for the model to read;
    /// only channel failures are errors.
    async fn execute(&self, args: Value) -> Result<String> {
        debug!(tool = %self.info.name, "◆ CALLING PROVIDER TOOL");

        let result = self.client.call_tool(&self.info.name, args).await?;

        let text = result.joined_text().ok_or_else(|| {
            McpError::Protocol(format!(
                "tool {} returned no text content",
                self.info.name
            ))
        })?;

        if result.is_error {
            warn!(tool = %self.info.name, "◆ TOOL REPORTED FAILURE: {}", text);
            return Ok(format!("Error from tool {}: {}", self.info.name, text));
        }

        Ok(text)
    }
}
