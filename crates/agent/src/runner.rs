//! Per-request driver: one provider session per user turn.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use catalyst_mcp::{McpClient, McpError, ServerParams, ToolInfo};
use catalyst_provider::{Message, Provider};

use crate::conversation::ConversationState;
use crate::error::unwrap_error;
use crate::loop_agent::{AgentLoop, LoopSettings};
use crate::tools::ToolRegistry;
use crate::{AgentError, Result};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub server: ServerParams,
    pub handshake_timeout: Duration,
    pub settings: LoopSettings,
}

/// Opens a fresh tool provider for every request and tears it down after.
pub struct Runner<P: Provider> {
    provider: Arc<P>,
    config: RunnerConfig,
}

impl<P: Provider> Runner<P> {
    pub fn new(provider: Arc<P>, config: RunnerConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Answer `user_text`, continuing from `history`.
    pub async fn run(
        &self,
        history: Vec<Message>,
        user_text: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let client = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            opened = McpClient::open(&self.config.server, self.config.handshake_timeout) => opened?,
        };

        self.run_with_client(Arc::new(client), history, user_text, cancel)
            .await
    }

    /// Same as [`run`](Self::run) over an already connected session, which is
    /// closed before returning.
    pub async fn run_with_client(
        &self,
        client: Arc<McpClient>,
        history: Vec<Message>,
        user_text: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("◆ RUN CANCELLED");
                Err(AgentError::Cancelled)
            }
            result = self.drive(&client, history, user_text) => result,
        };

        client.close().await;
        outcome
    }

    async fn drive(
        &self,
        client: &Arc<McpClient>,
        history: Vec<Message>,
        user_text: &str,
    ) -> Result<String> {
        let descriptors = client.list_tools().await?;
        let registry = Arc::new(ToolRegistry::from_mcp(Arc::clone(client), descriptors));

        let agent = AgentLoop::new(
            Arc::clone(&self.provider),
            registry,
            self.config.settings.clone(),
        );
        let mut conversation = ConversationState::with_history(history, user_text);

        let outcome = agent.run(&mut conversation).await?;
        Ok(outcome.answer)
    }

    /// Like [`run`](Self::run) but always yields text for the user.
    pub async fn answer(
        &self,
        history: Vec<Message>,
        user_text: &str,
        cancel: CancellationToken,
    ) -> String {
        match self.run(history, user_text, cancel).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("◆ RUN FAILED: {}", e);
                describe_failure(&e)
            }
        }
    }

    /// Open a session only to list the provider's tools.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let client =
            McpClient::open(&self.config.server, self.config.handshake_timeout).await?;
        let tools = client.list_tools().await;
        client.close().await;
        Ok(tools?)
    }
}

/// User-facing text for a failed run
pub fn describe_failure(err: &AgentError) -> String {
    match err {
        AgentError::Mcp(McpError::ProviderUnavailable(path)) => format!(
            "File Not Found: {}. Please ensure the tool provider script exists.",
            path.display()
        ),
        other => format!("REAL ERROR: {}", unwrap_error(other)),
    }
}
