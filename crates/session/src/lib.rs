//! Chat history shown to the user between turns
//!
//! Each session is a JSON file under the sessions directory. Only the
//! user's questions and the final answers are kept; tool traffic stays
//! inside a single run.

use catalyst_config::paths::safe_filename;
use catalyst_provider::Message;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum number of entries in a session
pub const DEFAULT_MAX_MESSAGES: usize = 100;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("SESSION STORAGE ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("SESSION FILE MALFORMED: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One displayed line of the chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    /// Shown to the user but never replayed to the model
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

/// A named chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub messages: Vec<Entry>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    DEFAULT_MAX_MESSAGES
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self::with_max_messages(key, DEFAULT_MAX_MESSAGES)
    }

    pub fn with_max_messages(key: impl Into<String>, max_messages: usize) -> Self {
        let now = Local::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            max_messages,
        }
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into(), false);
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into(), false);
    }

    /// Record the error text shown in place of an answer
    pub fn add_failure(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into(), true);
    }

    fn push(&mut self, role: Role, content: String, failed: bool) {
        let now = Local::now();
        self.messages.push(Entry {
            role,
            content,
            timestamp: now,
            failed,
        });
        self.updated_at = now;
        self.enforce_max_messages();
    }

    /// Drop the oldest entries beyond `max_messages`
    fn enforce_max_messages(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(0..excess);
            debug!(key = %self.key, kept = self.messages.len(), "◆ SESSION TRUNCATED");
        }
    }

    /// The last `limit` entries as model messages, leaving out failures
    pub fn get_history(&self, limit: usize) -> Vec<Message> {
        let replayable: Vec<&Entry> = self.messages.iter().filter(|e| !e.failed).collect();
        replayable
            .iter()
            .skip(replayable.len().saturating_sub(limit))
            .map(|entry| match entry.role {
                Role::User => Message::user(entry.content.clone()),
                Role::Assistant => Message::assistant(entry.content.clone()),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Local::now();
    }

    pub fn set_max_messages(&mut self, max_messages: usize) {
        self.max_messages = max_messages;
        self.enforce_max_messages();
    }
}

/// Loads, caches and persists sessions
pub struct SessionManager {
    sessions_dir: PathBuf,
    cache: HashMap<String, Session>,
    max_messages: usize,
}

impl SessionManager {
    pub fn new(sessions_dir: impl AsRef<Path>) -> Self {
        Self::with_max_messages(sessions_dir, DEFAULT_MAX_MESSAGES)
    }

    pub fn with_max_messages(sessions_dir: impl AsRef<Path>, max_messages: usize) -> Self {
        Self {
            sessions_dir: sessions_dir.as_ref().to_path_buf(),
            cache: HashMap::new(),
            max_messages,
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Cached session, else the stored one, else a fresh one
    pub async fn get_or_create(&mut self, key: &str) -> &mut Session {
        let stored = if self.cache.contains_key(key) {
            None
        } else {
            self.load(key).await
        };
        let max_messages = self.max_messages;
        self.cache
            .entry(key.to_string())
            .or_insert_with(|| {
                stored.unwrap_or_else(|| Session::with_max_messages(key, max_messages))
            })
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        tokio::fs::create_dir_all(&self.sessions_dir).await?;
        let content = serde_json::to_string_pretty(session)?;
        tokio::fs::write(self.session_path(&session.key), content).await?;
        debug!(key = %session.key, "◆ SESSION SAVED");
        Ok(())
    }

    async fn load(&self, key: &str) -> Option<Session> {
        let path = self.session_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, "◆ FAILED TO READ SESSION: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Session>(&content) {
            Ok(mut session) => {
                if session.max_messages != self.max_messages {
                    session.set_max_messages(self.max_messages);
                }
                debug!(key, "◆ SESSION LOADED");
                Some(session)
            }
            Err(e) => {
                warn!(key, "◆ FAILED TO PARSE SESSION: {}", e);
                None
            }
        }
    }

    fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", safe_filename(key)))
    }

    /// Remove a session from cache and disk; `false` if nothing was stored
    pub async fn delete(&mut self, key: &str) -> Result<bool> {
        self.cache.remove(key);
        match tokio::fs::remove_file(self.session_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys of all stored sessions, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut keys = Vec::new();

        let Ok(mut entries) = tokio::fs::read_dir(&self.sessions_dir).await else {
            return keys;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<Session>(&content) {
                Ok(session) => keys.push(session.key),
                Err(e) => warn!(path = %path.display(), "◆ SKIPPING MALFORMED SESSION: {}", e),
            }
        }

        keys.sort();
        keys
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }
}
