//! Error types for the tool provider channel.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The provider executable or script does not exist.
    #[error("TOOL PROVIDER NOT FOUND: {}", .0.display())]
    ProviderUnavailable(PathBuf),

    /// The initialize handshake did not finish in time.
    #[error("TOOL PROVIDER HANDSHAKE TIMED OUT AFTER {}s", .0.as_secs_f64())]
    StartupTimeout(Duration),

    /// The provider sent something that is not a valid reply.
    #[error("TOOL PROVIDER PROTOCOL ERROR: {0}")]
    Protocol(String),

    /// The channel closed or broke before a reply arrived.
    #[error("TOOL PROVIDER CHANNEL CLOSED: {0}")]
    Communication(String),

    /// The provider answered with a JSON-RPC error object.
    #[error("TOOL PROVIDER ERROR {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("JSON ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O ERROR: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, McpError>;
