//! Agent core
//!
//! Drives a chat model through tool-calling rounds against the tools exposed
//! by an MCP provider.
//!
//! - **conversation**: append-only message history of one run
//! - **tools**: tool trait, registry and the MCP-backed adapter
//! - **loop_agent**: the model/tool state machine
//! - **runner**: per-request session lifecycle around the loop
//! - **error**: flattening of nested failures into one message

use catalyst_mcp::McpError;
use catalyst_provider::ProviderError;
use thiserror::Error;

pub mod conversation;
pub mod error;
pub mod loop_agent;
pub mod runner;
pub mod tools;

pub use conversation::ConversationState;
pub use error::{unwrap_error, MAX_UNWRAP_DEPTH};
pub use loop_agent::{AgentLoop, AgentState, LoopSettings, RunOutcome};
pub use runner::{describe_failure, Runner, RunnerConfig};
pub use tools::{McpTool, ToolRegistry, ToolTrait};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    Mcp(#[from] McpError),

    #[error("MODEL INVOCATION FAILED: {0}")]
    Model(#[from] ProviderError),

    /// Failure raised by a local tool implementation
    #[error("{0}")]
    ToolExecution(String),

    #[error("MAX ITERATIONS EXCEEDED ({0} MODEL STEPS)")]
    MaxIterations(u32),

    #[error("RUN CANCELLED")]
    Cancelled,

    /// Several concurrent tool calls failed together
    #[error("{} CONCURRENT FAILURES", .0.len())]
    Aggregate(Vec<AgentError>),
}

pub type Result<T> = std::result::Result<T, AgentError>;
