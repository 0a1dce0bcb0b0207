//! Core types for model service operations and conversations.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::AftpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(crate::error::AftpError::configuration(format!(
                "unknown role '{}', expected 'user' or 'assistant'",
                other
            ))),
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A named message thread, optionally bound to a model.
///
/// Serialized as `{"id": .., "model": .. | null, "messages": [..]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Create an empty, unbound conversation
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: None,
            messages: Vec::new(),
        }
    }

    /// Bind a model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Service-specific sampling options (sent as the `options` object)
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
    /// Collect the streaming protocol instead of issuing a buffered request
    pub stream: bool,
    /// Per-call timeout; the service configuration default applies when unset
    pub timeout: Option<Duration>,
}

impl GenerateRequest {
    /// Create a new generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
            stream: false,
            timeout: None,
        }
    }

    /// Replace all options
    pub fn with_options(mut self, options: serde_json::Map<String, serde_json::Value>) -> Self {
        self.options = Some(options);
        self
    }

    /// Set one option
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    /// Use the streaming path when collecting
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Why a generation ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The service sent its completion signal
    Done,
    /// The connection closed without a completion signal
    Closed,
    /// The caller cancelled
    Cancelled,
}

/// Streaming text chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    pub delta: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl TextChunk {
    /// A fragment of generated text
    pub fn fragment(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: None,
        }
    }

    /// The terminal chunk of a stream
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            delta: String::new(),
            finish_reason: Some(reason),
        }
    }
}

/// Text generation result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextResult {
    pub content: String,
    pub finish_reason: FinishReason,
    pub model: String,
}

impl TextResult {
    /// Whether the caller cancelled before completion
    pub fn is_cancelled(&self) -> bool {
        self.finish_reason == FinishReason::Cancelled
    }
}

/// Service information
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
}

/// Per-call context used by layers for correlation
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub service_id: String,
    pub operation: &'static str,
}

impl RequestContext {
    /// Create a new request context
    pub fn new(service: &Arc<ServiceInfo>, operation: &'static str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            service_id: service.id.clone(),
            operation,
        }
    }
}
