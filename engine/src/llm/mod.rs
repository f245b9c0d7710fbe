//! Chat Transport Abstraction Layer
//!
//! This module provides a common interface for talking to a chat completion
//! backend. The ChatBackend trait defines the contract the orchestrator and
//! moderator code against, so the HTTP client in [`ollama`] and the scripted
//! backends used by tests are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur while talking to the chat backend.
///
/// Transport failures always surface to the immediate caller; the transport
/// itself never retries or recovers silently.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Cannot connect to backend at {0}. Is the server running?")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Reply carried no assistant content: {0}")]
    MissingContent(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Stream ended before the backend signalled completion")]
    IncompleteStream,
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Callback invoked with each incremental piece of assistant text during a
/// streaming request. Called synchronously on the requesting task, in arrival
/// order.
pub type FragmentHandler<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Chat backend trait implemented by transport clients
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Returns the name of the backend (e.g., "ollama")
    fn name(&self) -> &str;

    /// Send a chat request in buffered mode and return the full reply text
    ///
    /// # Arguments
    /// * `model` - Backend model identifier to run the request against
    /// * `messages` - Conversation history, oldest first
    async fn send(&self, model: &str, messages: &[Message]) -> Result<String>;

    /// Send a chat request in streaming mode
    ///
    /// `on_fragment` is invoked once per incremental piece of text. The
    /// concatenation of all fragments equals the returned full text, so
    /// callers may render incrementally and still trust the return value.
    async fn stream(
        &self,
        model: &str,
        messages: &[Message],
        on_fragment: FragmentHandler<'_>,
    ) -> Result<String>;

    /// Cheap reachability probe against the backend
    async fn check_health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "hello");

        let msg = Message::assistant("hi there");
        assert_eq!(msg.role, MessageRole::Assistant);

        let msg = Message::system("you are helpful");
        assert_eq!(msg.role, MessageRole::System);
    }

    #[test]
    fn test_message_role_serializes_lowercase() {
        let msg = Message::user("q");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));

        let msg = Message::assistant("a");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
    }

    #[test]
    fn test_message_role_display() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
        assert_eq!(MessageRole::System.to_string(), "system");
    }

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::Connection("http://localhost:11434".to_string());
        assert!(err.to_string().contains("Cannot connect"));

        let err = ChatError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert!(err.to_string().contains("500"));

        let err = ChatError::Timeout(120);
        assert!(err.to_string().contains("120"));
    }
}
