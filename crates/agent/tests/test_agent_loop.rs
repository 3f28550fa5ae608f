//! Orchestration loop against an in-process tool provider

mod common;

use catalyst_agent::{AgentError, AgentLoop, ConversationState, LoopSettings, ToolRegistry};
use catalyst_mcp::testing::FakeToolServer;
use catalyst_mcp::{CallToolResult, McpError};
use catalyst_provider::{Message, ProviderError};
use common::{call, ScriptedProvider};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn settings() -> LoopSettings {
    LoopSettings {
        model: "llama3-70b-8192".to_string(),
        ..Default::default()
    }
}

async fn registry_for(server: &FakeToolServer) -> Arc<ToolRegistry> {
    let client = Arc::new(server.connect().await.unwrap());
    let tools = client.list_tools().await.unwrap();
    Arc::new(ToolRegistry::from_mcp(client, tools))
}

fn inventory() -> FakeToolServer {
    FakeToolServer::new().tool("get_device_count", "Count devices", |_| {
        CallToolResult::text("42")
    })
}

#[tokio::test]
async fn test_two_step_answer() {
    let server = inventory();
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("call_1", "get_device_count", json!({}))])
            .then_text("There are 42 devices."),
    );
    let agent = AgentLoop::new(provider.clone(), registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("How many devices are there?");
    let outcome = agent.run(&mut conversation).await.unwrap();

    assert_eq!(outcome.answer, "There are 42 devices.");
    assert_eq!(outcome.model_steps, 2);
    assert_eq!(conversation.len(), 4);
    assert_eq!(
        conversation.messages()[2],
        Message::tool("call_1", "get_device_count", "42")
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].function.name, "get_device_count");
    assert_eq!(requests[1].messages.len(), 3);

    // each step sees exactly the conversation as it stood when it was sent
    let final_view = conversation.snapshot();
    assert_eq!(&requests[0].messages[..], &final_view[..1]);
    assert_eq!(&requests[1].messages[..], &final_view[..3]);
}

#[tokio::test]
async fn test_direct_answer_without_tools() {
    let server = inventory();
    let provider = Arc::new(ScriptedProvider::new().then_text("Hello!"));
    let agent = AgentLoop::new(provider, registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("hi");
    let outcome = agent.run(&mut conversation).await.unwrap();

    assert_eq!(outcome.answer, "Hello!");
    assert_eq!(outcome.model_steps, 1);
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn test_system_prompt_is_prepended_not_stored() {
    let server = inventory();
    let provider = Arc::new(ScriptedProvider::new().then_text("ok"));
    let agent = AgentLoop::new(
        provider.clone(),
        registry_for(&server).await,
        LoopSettings {
            system_prompt: Some("You manage a campus network.".to_string()),
            ..settings()
        },
    );

    let mut conversation = ConversationState::new("status?");
    agent.run(&mut conversation).await.unwrap();

    let sent = &provider.requests()[0].messages;
    assert_eq!(sent[0], Message::system("You manage a campus network."));
    assert_eq!(conversation.messages()[0], Message::user("status?"));
}

#[tokio::test]
async fn test_tool_failure_is_folded_into_conversation() {
    let server = FakeToolServer::new().tool("get_sites", "List sites", |_| {
        CallToolResult::error("rate limited")
    });
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("call_7", "get_sites", json!({}))])
            .then_text("The site service is busy, try again shortly."),
    );
    let agent = AgentLoop::new(provider.clone(), registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("list sites");
    let outcome = agent.run(&mut conversation).await.unwrap();

    assert_eq!(outcome.model_steps, 2);
    assert_eq!(
        conversation.messages()[2].content(),
        Some("Error from tool get_sites: rate limited")
    );
}

#[tokio::test]
async fn test_concurrent_results_keep_request_order() {
    let server = FakeToolServer::new()
        .tool("slow_lookup", "slow", |_| CallToolResult::text("slow"))
        .tool("fast_lookup", "fast", |_| CallToolResult::text("fast"))
        .delay("slow_lookup", Duration::from_millis(150));
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![
                call("call_a", "slow_lookup", json!({})),
                call("call_b", "fast_lookup", json!({})),
            ])
            .then_text("done"),
    );
    let agent = AgentLoop::new(provider, registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("look both up");
    agent.run(&mut conversation).await.unwrap();

    let messages = conversation.messages();
    assert_eq!(messages[2], Message::tool("call_a", "slow_lookup", "slow"));
    assert_eq!(messages[3], Message::tool("call_b", "fast_lookup", "fast"));
}

#[tokio::test]
async fn test_unknown_tool_reported_to_model() {
    let server = inventory();
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("call_1", "reboot_core", json!({}))])
            .then_text("I cannot do that."),
    );
    let agent = AgentLoop::new(provider, registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("reboot the core switch");
    let outcome = agent.run(&mut conversation).await.unwrap();

    assert_eq!(outcome.answer, "I cannot do that.");
    assert_eq!(
        conversation.messages()[2],
        Message::tool_error("call_1", "reboot_core", "Error: tool 'reboot_core' not found")
    );
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn test_argument_normalisation() {
    let server = FakeToolServer::new().tool("echo", "Echo arguments", |args| {
        CallToolResult::text(args.to_string())
    });
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![
                call("call_1", "echo", serde_json::Value::Null),
                call("call_2", "echo", json!("not json")),
            ])
            .then_text("ok"),
    );
    let agent = AgentLoop::new(provider, registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("echo");
    agent.run(&mut conversation).await.unwrap();

    assert_eq!(conversation.messages()[2].content(), Some("{}"));
    assert_eq!(
        conversation.messages()[3],
        Message::tool_error(
            "call_2",
            "echo",
            "Error: arguments for tool 'echo' must be a JSON object"
        )
    );
    assert_eq!(server.calls().len(), 1);
}

#[tokio::test]
async fn test_iteration_cap() {
    let server = inventory();
    let mut script = ScriptedProvider::new();
    for i in 0..5 {
        script = script.then_calls(vec![call(&format!("call_{}", i), "get_device_count", json!({}))]);
    }
    let provider = Arc::new(script);
    let agent = AgentLoop::new(
        provider.clone(),
        registry_for(&server).await,
        LoopSettings {
            max_iterations: 3,
            ..settings()
        },
    );

    let mut conversation = ConversationState::new("loop forever");
    let err = agent.run(&mut conversation).await.unwrap_err();

    assert!(matches!(err, AgentError::MaxIterations(3)));
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn test_model_error_aborts() {
    let server = inventory();
    let provider = Arc::new(ScriptedProvider::new().then_error(ProviderError::RateLimited));
    let agent = AgentLoop::new(provider, registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("hi");
    let err = agent.run(&mut conversation).await.unwrap_err();

    assert!(matches!(err, AgentError::Model(ProviderError::RateLimited)));
    assert_eq!(conversation.len(), 1);
}

#[tokio::test]
async fn test_empty_tool_content_is_protocol_error() {
    let server = FakeToolServer::new().raw_tool("blank", "returns nothing", json!({ "content": [] }));
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_calls(vec![call("call_1", "blank", json!({}))])
            .then_text("unreachable"),
    );
    let agent = AgentLoop::new(provider, registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("go");
    let err = agent.run(&mut conversation).await.unwrap_err();

    assert!(matches!(err, AgentError::Mcp(McpError::Protocol(_))));
}

#[tokio::test]
async fn test_sibling_failures_are_aggregated() {
    let server = FakeToolServer::new()
        .raw_tool("first", "broken", json!({ "content": [] }))
        .raw_tool("second", "broken", json!({ "content": [] }))
        .tool("third", "fine", |_| CallToolResult::text("ok"));
    let provider = Arc::new(ScriptedProvider::new().then_calls(vec![
        call("call_1", "first", json!({})),
        call("call_2", "second", json!({})),
        call("call_3", "third", json!({})),
    ]));
    let agent = AgentLoop::new(provider, registry_for(&server).await, settings());

    let mut conversation = ConversationState::new("go");
    let err = agent.run(&mut conversation).await.unwrap_err();

    match err {
        AgentError::Aggregate(children) => {
            assert_eq!(children.len(), 2);
            assert!(children[0].to_string().contains("first"));
            assert!(children[1].to_string().contains("second"));
        }
        other => panic!("expected aggregate, got {:?}", other),
    }
}
