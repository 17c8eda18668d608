//! LLM request/response types for Parley.
//!
//! These types model the data shapes exchanged with a model transport:
//! completion requests, streaming events, response metadata, and errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chat::{ToolCall, Turn, TurnContent};

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message as sent to the transport.
///
/// The wire-facing projection of a [`Turn`]: only role and content survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: TurnContent,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// Request to a model transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Build a request from an ordered list of turns.
    pub fn from_turns(model: impl Into<String>, turns: &[Turn], stream: bool) -> Self {
        Self {
            model: model.into(),
            messages: turns.iter().map(Message::from).collect(),
            max_tokens: None,
            temperature: None,
            stream,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Transport-level metadata attached to a finished response.
///
/// `status` mirrors the HTTP status of the provider call; title and
/// summary commits are gated on [`ResponseMeta::is_success`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl ResponseMeta {
    pub fn ok() -> Self {
        Self {
            status: 200,
            id: None,
            model: None,
            usage: Usage::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self::ok()
    }
}

/// Token usage reported by the provider, when available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Response from a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub meta: ResponseMeta,
}

/// Events emitted by a streaming exchange.
///
/// Text arrives as cumulative snapshots: each `Update` carries the full
/// visible text so far, never a delta. The stream ends with exactly one
/// `Finished` event or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Cumulative text produced so far.
    Update { text: String },

    /// The model started a tool call.
    ToolStarted(ToolCall),

    /// A tool call finished (matched to its start by `id`).
    ToolFinished(ToolCall),

    /// Terminal event with the final text.
    Finished { text: String, meta: ResponseMeta },
}

/// Marker the transport puts in cancellation errors.
pub const ABORTED_MARKER: &str = "aborted";

/// Errors from model transport operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("the operation was aborted")]
    Aborted,
}

impl LlmError {
    /// Whether this error is an explicit cancellation rather than a failure.
    ///
    /// Transports that cannot raise [`LlmError::Aborted`] directly surface
    /// cancellation as a message containing the `"aborted"` marker.
    pub fn is_abort(&self) -> bool {
        matches!(self, LlmError::Aborted) || self.to_string().contains(ABORTED_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_message_role_serde() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_is_abort_variant() {
        assert!(LlmError::Aborted.is_abort());
    }

    #[test]
    fn test_is_abort_marker_in_message() {
        let err = LlmError::Stream("request aborted by client".to_string());
        assert!(err.is_abort());
    }

    #[test]
    fn test_transport_error_is_not_abort() {
        let err = LlmError::Provider {
            message: "HTTP 500".to_string(),
        };
        assert!(!err.is_abort());
        assert!(!LlmError::AuthenticationFailed.is_abort());
    }

    #[test]
    fn test_response_meta_success() {
        assert!(ResponseMeta::ok().is_success());
        let meta = ResponseMeta {
            status: 502,
            ..ResponseMeta::ok()
        };
        assert!(!meta.is_success());
    }

    #[test]
    fn test_stream_event_tagging() {
        let event = StreamEvent::Update {
            text: "abc".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"update\""));
    }
}
