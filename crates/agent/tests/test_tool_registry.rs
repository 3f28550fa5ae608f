//! Tool registry and local tools

use async_trait::async_trait;
use catalyst_agent::tools::{to_provider_tool, ToolRegistry, ToolTrait};
use catalyst_agent::{AgentError, AgentLoop, ConversationState, LoopSettings};
use catalyst_provider::{ChatParams, ChatResponse, Message, Provider, ProviderError, ToolCall};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;

struct StaticTool {
    name: &'static str,
    reply: Result<&'static str, &'static str>,
}

#[async_trait]
impl ToolTrait for StaticTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "static reply"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> catalyst_agent::Result<String> {
        self.reply
            .map(str::to_string)
            .map_err(|e| AgentError::ToolExecution(e.to_string()))
    }
}

fn tool(name: &'static str) -> StaticTool {
    StaticTool {
        name,
        reply: Ok("ok"),
    }
}

mock! {
    pub Llm {}

    #[async_trait]
    impl Provider for Llm {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

#[test]
fn test_registry_empty() {
    let registry = ToolRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.definitions().is_empty());
}

#[test]
fn test_definitions_follow_registration_order() {
    let mut registry = ToolRegistry::new();
    registry.register(tool("get_sites"));
    registry.register(tool("get_device_count"));
    registry.register(tool("get_health"));

    let names: Vec<String> = registry
        .definitions()
        .into_iter()
        .map(|t| t.function.name)
        .collect();
    assert_eq!(names, vec!["get_sites", "get_device_count", "get_health"]);
    assert_eq!(registry.names(), names);
}

#[test]
fn test_reregister_replaces_in_place() {
    let mut registry = ToolRegistry::new();
    registry.register(tool("a"));
    registry.register(tool("b"));
    registry.register(StaticTool {
        name: "a",
        reply: Ok("second"),
    });

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), vec!["a", "b"]);
}

#[test]
fn test_provider_tool_mapping() {
    let declared = to_provider_tool(&tool("get_sites"));
    assert_eq!(declared.tool_type, "function");
    assert_eq!(declared.function.name, "get_sites");
    assert_eq!(declared.function.description, "static reply");
    assert_eq!(declared.function.parameters["type"], "object");
}

#[tokio::test]
async fn test_execute_known_and_unknown() {
    let mut registry = ToolRegistry::new();
    registry.register(tool("get_sites"));

    let result = registry.execute("get_sites", json!({})).await;
    assert_eq!(result.unwrap().unwrap(), "ok");
    assert!(registry.execute("missing", json!({})).await.is_none());
}

#[tokio::test]
async fn test_local_tool_failure_aborts_run() {
    let mut registry = ToolRegistry::new();
    registry.register(StaticTool {
        name: "flaky",
        reply: Err("backend unreachable"),
    });

    let mut llm = MockLlm::new();
    llm.expect_chat().times(1).returning(|_| {
        Ok(ChatResponse::tool_calls(vec![ToolCall::new(
            "call_1",
            "flaky",
            json!({}),
        )]))
    });

    let agent = AgentLoop::new(Arc::new(llm), Arc::new(registry), LoopSettings::default());
    let mut conversation = ConversationState::new("try it");
    let err = agent.run(&mut conversation).await.unwrap_err();

    assert_eq!(err.to_string(), "backend unreachable");
}

#[tokio::test]
async fn test_mocked_model_sees_tool_result() {
    let mut registry = ToolRegistry::new();
    registry.register(tool("get_health"));

    let mut llm = MockLlm::new();
    let mut seq = mockall::Sequence::new();
    llm.expect_chat()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Ok(ChatResponse::tool_calls(vec![ToolCall::new(
                "call_9",
                "get_health",
                json!({}),
            )]))
        });
    llm.expect_chat()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|params| {
            params
                .messages
                .last()
                .map(|m| *m == Message::tool("call_9", "get_health", "ok"))
                .unwrap_or(false)
        })
        .returning(|_| Ok(ChatResponse::text("All healthy.")));

    let agent = AgentLoop::new(Arc::new(llm), Arc::new(registry), LoopSettings::default());
    let mut conversation = ConversationState::new("health?");
    let outcome = agent.run(&mut conversation).await.unwrap();

    assert_eq!(outcome.answer, "All healthy.");
    assert_eq!(outcome.model_steps, 2);
}
