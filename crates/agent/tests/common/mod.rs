//! Shared test helpers

#![allow(dead_code)]

use async_trait::async_trait;
use catalyst_provider::{ChatParams, ChatResponse, Provider, ProviderError, Result, ToolCall};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Provider that replays canned responses and records every request
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ChatResponse>>>,
    requests: Mutex<Vec<ChatParams>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_text(self, text: &str) -> Self {
        self.push(Ok(ChatResponse::text(text)))
    }

    pub fn then_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(ChatResponse::tool_calls(calls)))
    }

    pub fn then_error(self, err: ProviderError) -> Self {
        self.push(Err(err))
    }

    fn push(self, response: Result<ChatResponse>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<ChatParams> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(params);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }

    fn default_model(&self) -> String {
        "scripted".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}
