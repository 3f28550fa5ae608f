//! Message history of one agent run.

use catalyst_provider::Message;
use std::sync::Arc;

/// Ordered, append-only conversation.
///
/// Every state observed during a run is a prefix of every later state.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Start a conversation from a single user message
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(user_text)],
        }
    }

    /// Start from earlier turns followed by a new user message
    pub fn with_history(history: Vec<Message>, user_text: impl Into<String>) -> Self {
        let mut messages = history;
        messages.push(Message::user(user_text));
        Self { messages }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> Arc<[Message]> {
        Arc::from(self.messages.as_slice())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent assistant message, if any
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Assistant { .. }))
    }
}
