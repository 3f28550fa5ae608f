//! Agent loop - alternates model steps and tool execution

use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use catalyst_provider::{ChatParams, Message, Provider, ToolCall, ToolChoice};

use crate::conversation::ConversationState;
use crate::tools::ToolRegistry;
use crate::{AgentError, Result};

/// Where the loop is in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// Per-run model settings
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on model steps in one run
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 1024,
            temperature: 0.0,
            max_iterations: 10,
            system_prompt: None,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub answer: String,
    pub model_steps: u32,
}

/// Drives one conversation to a final answer
pub struct AgentLoop<P: Provider> {
    provider: Arc<P>,
    tools: Arc<ToolRegistry>,
    settings: LoopSettings,
}

impl<P: Provider> AgentLoop<P> {
    pub fn new(provider: Arc<P>, tools: Arc<ToolRegistry>, settings: LoopSettings) -> Self {
        Self {
            provider,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run until the model answers without requesting tools.
    ///
    /// Every message produced along the way is appended to `conversation`.
    pub async fn run(&self, conversation: &mut ConversationState) -> Result<RunOutcome> {
        let mut state = AgentState::AwaitingModel;
        let mut steps = 0u32;

        loop {
            match state {
                AgentState::AwaitingModel => {
                    if steps >= self.settings.max_iterations {
                        warn!(steps, "◆ ITERATION CAP REACHED");
                        return Err(AgentError::MaxIterations(self.settings.max_iterations));
                    }
                    steps += 1;
                    debug!(step = steps, "◆ MODEL STEP");

                    let response = self
                        .provider
                        .chat(self.build_params(&conversation.snapshot()))
                        .await?;

                    state = if response.has_tool_calls() {
                        AgentState::ExecutingTools
                    } else {
                        AgentState::Done
                    };
                    conversation.append(response.into_message());
                }
                AgentState::ExecutingTools => {
                    let calls = conversation
                        .last_assistant()
                        .map(|m| m.tool_calls().to_vec())
                        .unwrap_or_default();

                    for message in self.execute_calls(&calls).await? {
                        conversation.append(message);
                    }
                    state = AgentState::AwaitingModel;
                }
                AgentState::Done => {
                    let answer = conversation
                        .last_assistant()
                        .and_then(Message::content)
                        .unwrap_or_default()
                        .to_string();

                    info!(steps, "◆ RUN COMPLETE");
                    return Ok(RunOutcome {
                        answer,
                        model_steps: steps,
                    });
                }
            }
        }
    }

    fn build_params(&self, history: &[Message]) -> ChatParams {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.settings.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(history.iter().cloned());

        ChatParams {
            model: self.settings.model.clone(),
            messages,
            tools: self.tools.definitions(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            tool_choice: ToolChoice::Auto,
        }
    }

    /// Run every call of one step concurrently; results keep request order.
    async fn execute_calls(&self, calls: &[ToolCall]) -> Result<Vec<Message>> {
        info!(count = calls.len(), "◆ EXECUTING TOOL CALLS");

        let results = join_all(calls.iter().map(|call| self.execute_call(call))).await;

        let mut messages = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(message) => messages.push(message),
                Err(e) => failures.push(e),
            }
        }

        match failures.len() {
            0 => Ok(messages),
            1 => Err(failures.remove(0)),
            _ => Err(AgentError::Aggregate(failures)),
        }
    }

    async fn execute_call(&self, call: &ToolCall) -> Result<Message> {
        let args = match &call.arguments {
            Value::Object(_) => call.arguments.clone(),
            Value::Null => Value::Object(Map::new()),
            _ => {
                warn!(tool = %call.name, "◆ NON-OBJECT TOOL ARGUMENTS");
                return Ok(Message::tool_error(
                    &call.id,
                    &call.name,
                    format!("Error: arguments for tool '{}' must be a JSON object", call.name),
                ));
            }
        };

        debug!(tool = %call.name, id = %call.id, "◆ DEPLOYING TOOL");

        match self.tools.execute(&call.name, args).await {
            Some(Ok(content)) => Ok(Message::tool(&call.id, &call.name, content)),
            Some(Err(e)) => Err(e),
            None => {
                warn!(tool = %call.name, "◆ MODEL REQUESTED UNKNOWN TOOL");
                Ok(Message::tool_error(
                    &call.id,
                    &call.name,
                    format!("Error: tool '{}' not found", call.name),
                ))
            }
        }
    }
}
