//! OpenAI-compatible chat-completions backend
//!
//! Covers Groq and OpenAI, which share the `/chat/completions` wire format.

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace};

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Which hosted API a provider instance talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    OpenAi,
    Custom,
}

impl ProviderKind {
    fn detect(api_key: &str, api_base: Option<&str>) -> Self {
        match api_base {
            Some(base) if base.contains("groq.com") => ProviderKind::Groq,
            Some(base) if base.contains("api.openai.com") => ProviderKind::OpenAi,
            Some(_) => ProviderKind::Custom,
            None if api_key.starts_with("gsk_") => ProviderKind::Groq,
            None => ProviderKind::OpenAi,
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "qwen/qwen3-32b",
            ProviderKind::OpenAi | ProviderKind::Custom => "gpt-4o",
        }
    }
}

/// Chat-completions client
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
    kind: ProviderKind,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let api_key = api_key.into();
        let kind = ProviderKind::detect(&api_key, api_base.as_deref());

        let api_base = api_base
            .map(|b| b.trim_end_matches('/').to_string())
            .unwrap_or_else(|| match kind {
                ProviderKind::Groq => GROQ_API_BASE.to_string(),
                _ => OPENAI_API_BASE.to_string(),
            });

        let default_model = default_model.unwrap_or_else(|| kind.default_model().to_string());

        Self {
            client: Client::new(),
            api_key,
            api_base,
            default_model,
            kind,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn encode_message(message: &Message) -> serde_json::Value {
        match message {
            Message::System { content } => json!({ "role": "system", "content": content }),
            Message::User { content } => json!({ "role": "user", "content": content }),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut obj = json!({ "role": "assistant", "content": content });
                if !tool_calls.is_empty() {
                    let calls: Vec<serde_json::Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": &tc.id,
                                "type": "function",
                                "function": {
                                    "name": &tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(calls);
                }
                obj
            }
            Message::Tool {
                tool_call_id,
                content,
                ..
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        }
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        let messages: Vec<serde_json::Value> =
            params.messages.iter().map(Self::encode_message).collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });

        if !params.tools.is_empty() {
            let tools: Vec<serde_json::Value> = params
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": &t.function.name,
                            "description": &t.function.description,
                            "parameters": &t.function.parameters
                        }
                    })
                })
                .collect();

            body["tools"] = json!(tools);
            body["tool_choice"] = match &params.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Required(name) => {
                    json!({"type": "function", "function": {"name": name}})
                }
                ToolChoice::None => json!("none"),
            };
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices".to_string()))?;
        let message = &choice["message"];
        let content = message["content"].as_str().map(|s| s.to_string());
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for (index, call) in calls.iter().enumerate() {
                let function = &call["function"];
                let name = function["name"]
                    .as_str()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        ProviderError::InvalidResponse(format!("tool call {} has no name", index))
                    })?;

                // Arguments arrive as a JSON string; some backends send an object
                let args = match &function["arguments"] {
                    serde_json::Value::String(s) if s.trim().is_empty() => json!({}),
                    serde_json::Value::String(s) => serde_json::from_str(s)
                        .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
                    serde_json::Value::Null => json!({}),
                    other => other.clone(),
                };

                let id = call["id"]
                    .as_str()
                    .filter(|id| !id.is_empty())
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| format!("call_{}", index));

                tool_calls.push(ToolCall {
                    id,
                    name: name.to_string(),
                    arguments: args,
                });
            }
        }

        let usage = if let Some(usage) = json["usage"].as_object() {
            let field = |k: &str| usage.get(k).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            Usage {
                prompt_tokens: field("prompt_tokens"),
                completion_tokens: field("completion_tokens"),
                total_tokens: field("total_tokens"),
            }
        } else {
            Usage::default()
        };

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if !self.is_configured() {
            return Err(ProviderError::NoApiKey);
        }

        trace!("◆ POSTING TO {} ({:?})", self.api_base, self.kind);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let error = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(ProviderError::Api(error));
        }

        let json: serde_json::Value = serde_json::from_str(&text)?;

        debug!(
            "◆ MODEL RESPONSE: {} TOOL CALLS",
            json["choices"][0]["message"]["tool_calls"]
                .as_array()
                .map(|v| v.len())
                .unwrap_or(0)
        );

        self.parse_response(json)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
