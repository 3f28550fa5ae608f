//! Tool provider channel
//!
//! Speaks the Model Context Protocol (JSON-RPC 2.0, newline-delimited) to a
//! tool provider running as a child process on stdio.
//!
//! - **types**: JSON-RPC and MCP wire types
//! - **params**: how to launch the provider process
//! - **client**: handshake, tool discovery and tool invocation
//! - **error**: failure taxonomy of the channel
//! - **testing**: in-process fake provider (`test-util` feature)

pub mod client;
pub mod error;
pub mod params;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::McpClient;
pub use error::{McpError, Result};
pub use params::ServerParams;
pub use types::{CallToolResult, ServerInfo, ToolContent, ToolInfo};
