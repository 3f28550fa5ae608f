//! Configuration management for Catalyst Assist
//!
//! Loads the chat front-end settings from `~/.catalyst/config.json`, a local
//! `.env` file and process environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, sessions_dir};

/// Errors in configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CONFIG PARSE FAILED: {0}")]
    Json(#[from] serde_json::Error),

    #[error("INVALID SETTING {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which hosted chat-completions backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Groq,
    OpenAi,
}

impl LlmBackend {
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "qwen/qwen3-32b",
            LlmBackend::OpenAi => "gpt-4o",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "https://api.groq.com/openai/v1",
            LlmBackend::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn key_var(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "GROQ_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn model_var(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "GROQ_MODEL",
            LlmBackend::OpenAi => "OPENAI_MODEL",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(LlmBackend::Groq),
            "openai" => Ok(LlmBackend::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "llm.provider".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmBackend,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmBackend::default(),
            api_key: String::new(),
            api_base: None,
            model: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

fn default_max_tokens() -> u32 {
    1024
}

/// Orchestration loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Seed each run with the persisted chat turns of the session
    #[serde(default)]
    pub carry_history: bool,
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
            carry_history: false,
            history_messages: default_history_messages(),
        }
    }
}

fn default_max_iterations() -> u32 {
    10
}

fn default_history_messages() -> usize {
    20
}

/// Tool provider process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_script")]
    pub script: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            script: default_script(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

fn default_command() -> String {
    "python3".to_string()
}

fn default_script() -> Option<String> {
    Some("catalyst-center-mcp.py".to_string())
}

fn default_handshake_timeout() -> u64 {
    30
}

/// Chat history persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_max_messages")]
    pub max_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: default_session_max_messages(),
        }
    }
}

fn default_session_max_messages() -> usize {
    100
}

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tool_server: ToolServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load `.env`, the default config file and environment overrides
    pub async fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("◆ LOADED ENVIRONMENT FROM {:?}", path);
        }
        let mut config = Self::load_from(&config_path()).await?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from specific location, without environment overrides
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ READING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        self.save_to(&config_path()).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = lookup("CATALYST_LLM_PROVIDER") {
            self.llm.provider = backend.parse()?;
        }
        if let Some(key) = lookup(self.llm.provider.key_var()) {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup(self.llm.provider.model_var()) {
            self.llm.model = Some(model);
        }
        if let Some(command) = lookup("CATALYST_MCP_COMMAND") {
            self.tool_server.command = command;
        }
        if let Some(script) = lookup("CATALYST_MCP_SCRIPT") {
            self.tool_server.script = Some(script);
        }
        Ok(())
    }

    /// Configured API key, if any
    pub fn api_key(&self) -> Option<String> {
        let key = self.llm.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Model identifier, falling back to the backend default
    pub fn model(&self) -> String {
        self.llm
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.llm.provider.default_model().to_string())
    }

    /// Chat-completions base URL, falling back to the backend default
    pub fn api_base(&self) -> String {
        self.llm
            .api_base
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| self.llm.provider.default_api_base().to_string())
    }

    /// Absolute location of the tool provider script
    pub fn script_path(&self) -> Option<PathBuf> {
        let script = self.tool_server.script.as_deref()?;
        if script.is_empty() {
            return None;
        }
        let path = paths::expand_home(script);
        if path.is_absolute() {
            return Some(path);
        }
        match std::env::current_dir() {
            Ok(cwd) => Some(cwd.join(path)),
            Err(e) => {
                warn!("◆ CANNOT RESOLVE WORKING DIRECTORY: {}", e);
                Some(path)
            }
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_server.handshake_timeout_secs)
    }

    pub fn session_max_messages(&self) -> usize {
        self.session.max_messages
    }
}

/// Write a default config file if none exists, then load it
pub async fn init() -> Result<Config> {
    let path = config_path();

    if path.exists() {
        warn!("◆ CONFIG ALREADY PRESENT AT {:?}", path);
    } else {
        Config::default().save().await?;
        info!("◆ CONFIG WRITTEN TO {:?}", path);
    }

    paths::ensure_dir(&sessions_dir()).await?;

    Config::load().await
}
