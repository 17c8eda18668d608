//! Turn, session, and rolling-memory types for Parley.
//!
//! A [`Session`] is an ordered list of [`Turn`]s plus the state the context
//! engine needs to decide what to send: pinned context, the rolling summary,
//! the manual clear point, and per-session model configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;

/// Placeholder topic of a session that has not been titled yet.
pub const DEFAULT_TOPIC: &str = "New Conversation";

/// One part of a multimodal turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { url: String },
}

/// Content of a turn: plain text or ordered multimodal parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl TurnContent {
    /// The text used for estimation and display.
    ///
    /// For multimodal content this is the first text part, or `""`.
    pub fn text(&self) -> &str {
        match self {
            TurnContent::Text(text) => text,
            TurnContent::Parts(parts) => parts
                .iter()
                .find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .unwrap_or(""),
        }
    }

    /// Append text to the content, preserving multimodal parts.
    pub fn append_text(&mut self, suffix: &str) {
        match self {
            TurnContent::Text(text) => text.push_str(suffix),
            TurnContent::Parts(parts) => {
                match parts.iter_mut().find_map(|p| match p {
                    ContentPart::Text { text } => Some(text),
                    ContentPart::ImageUrl { .. } => None,
                }) {
                    Some(text) => text.push_str(suffix),
                    None => parts.push(ContentPart::Text {
                        text: suffix.to_string(),
                    }),
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TurnContent::Text(text) => text.is_empty(),
            TurnContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl Default for TurnContent {
    fn default() -> Self {
        TurnContent::Text(String::new())
    }
}

impl From<String> for TurnContent {
    fn from(text: String) -> Self {
        TurnContent::Text(text)
    }
}

impl From<&str> for TurnContent {
    fn from(text: &str) -> Self {
        TurnContent::Text(text.to_string())
    }
}

/// Function details of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A tool call made by the model while producing a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ToolFunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: None,
            kind: Some("function".to_string()),
            function: Some(ToolFunction {
                name: name.into(),
                arguments: None,
            }),
            content: None,
            is_error: false,
            error_msg: None,
        }
    }
}

/// One message in a conversation.
///
/// A turn is immutable once it is neither streaming nor errored. While
/// `streaming` is set, the exchange coordinator replaces its content with
/// each new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: TurnContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Model that produced this turn (assistant turns only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// User turn carrying a tool result back to the model.
    #[serde(default)]
    pub is_tool_reply: bool,
}

impl Turn {
    pub fn new(role: MessageRole, content: impl Into<TurnContent>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            streaming: false,
            is_error: false,
            tool_calls: Vec::new(),
            model: None,
            is_tool_reply: false,
        }
    }

    pub fn system(content: impl Into<TurnContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<TurnContent>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<TurnContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// An empty assistant turn awaiting a streamed reply.
    pub fn pending_reply(model: impl Into<String>) -> Self {
        Self {
            streaming: true,
            model: Some(model.into()),
            ..Self::assistant(TurnContent::default())
        }
    }

    pub fn text(&self) -> &str {
        self.content.text()
    }

    /// Insert a tool call, or replace the existing one with the same id.
    pub fn upsert_tool_call(&mut self, call: ToolCall) {
        match self.tool_calls.iter_mut().find(|t| t.id == call.id) {
            Some(existing) => *existing = call,
            None => self.tool_calls.push(call),
        }
    }
}

/// The single rolling summary of a session's older turns.
///
/// `last_summarized_index` is the turn count at the moment the compaction
/// that produced `summary` was triggered. Both fields are always replaced
/// together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingMemory {
    pub summary: String,
    pub last_summarized_index: usize,
}

impl RollingMemory {
    pub fn has_summary(&self) -> bool {
        !self.summary.is_empty()
    }
}

/// Cumulative usage counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStat {
    pub token_count: u64,
    pub word_count: u64,
    pub char_count: u64,
}

/// Per-session model and context configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// History token budget, also the maximum context size used to bound
    /// the compaction input.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Maximum number of recent turns eligible for the short-term window.
    #[serde(default = "default_history_message_count")]
    pub history_message_count: usize,
    /// Estimated token count above which the pending history is compacted.
    #[serde(default = "default_compress_threshold")]
    pub compress_message_length_threshold: usize,
    #[serde(default = "default_true")]
    pub send_memory: bool,
    #[serde(default = "default_true")]
    pub enable_inject_system_prompts: bool,
    #[serde(default = "default_input_template")]
    pub input_template: String,
    /// Model used for summaries and titles; falls back to `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_cutoff: Option<String>,
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> usize {
    4000
}

fn default_history_message_count() -> usize {
    4
}

fn default_compress_threshold() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_input_template() -> String {
    "{{input}}".to_string()
}

impl SessionConfig {
    /// Model used for background summary and title calls.
    pub fn summary_model(&self) -> &str {
        self.compress_model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_message_count: default_history_message_count(),
            compress_message_length_threshold: default_compress_threshold(),
            send_memory: true,
            enable_inject_system_prompts: true,
            input_template: default_input_template(),
            compress_model: None,
            knowledge_cutoff: None,
        }
    }
}

/// A chat session.
///
/// `turns` is shared copy-on-write: every mutation goes through
/// [`Session::update_turns`], which installs a fresh `Arc`, so a reader
/// holding an older list never observes a partial edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub topic: String,
    pub turns: Arc<Vec<Turn>>,
    /// Turns always sent ahead of the short-term window.
    #[serde(default)]
    pub pinned_context: Vec<Turn>,
    #[serde(default)]
    pub rolling_memory: RollingMemory,
    /// User-requested truncation point. Only ever increases.
    #[serde(default)]
    pub manual_clear_index: usize,
    /// Bumped by every reset; indexes captured under an older value no
    /// longer refer to these turns.
    #[serde(default)]
    pub timeline: u64,
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub stats: ChatStat,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            topic: DEFAULT_TOPIC.to_string(),
            turns: Arc::new(Vec::new()),
            pinned_context: Vec::new(),
            rolling_memory: RollingMemory::default(),
            manual_clear_index: 0,
            timeline: 0,
            config,
            stats: ChatStat::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn has_default_topic(&self) -> bool {
        self.topic == DEFAULT_TOPIC
    }

    pub fn find_turn(&self, turn_id: Uuid) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == turn_id)
    }

    /// Replace the turn list with an edited copy.
    pub fn update_turns(&mut self, edit: impl FnOnce(&mut Vec<Turn>)) {
        let mut turns = Vec::clone(&self.turns);
        edit(&mut turns);
        self.turns = Arc::new(turns);
        self.touch();
    }

    /// Edit a single turn by id. Returns `false` when the turn is gone.
    pub fn update_turn(&mut self, turn_id: Uuid, edit: impl FnOnce(&mut Turn)) -> bool {
        let Some(position) = self.turns.iter().position(|t| t.id == turn_id) else {
            return false;
        };
        self.update_turns(|turns| edit(&mut turns[position]));
        true
    }

    /// Move the manual clear point to the end of the current history.
    pub fn clear_context(&mut self) {
        self.manual_clear_index = self.manual_clear_index.max(self.turns.len());
        self.touch();
    }

    /// Drop all turns and the rolling memory, starting a new timeline.
    pub fn reset(&mut self) {
        self.turns = Arc::new(Vec::new());
        self.rolling_memory = RollingMemory::default();
        self.manual_clear_index = 0;
        self.timeline = self.timeline.wrapping_add(1);
        self.touch();
    }

    /// Copy this session under a new id with fresh turn ids.
    pub fn fork(&self) -> Self {
        let now = Utc::now();
        let turns = self
            .turns
            .iter()
            .map(|t| Turn {
                id: Uuid::now_v7(),
                ..t.clone()
            })
            .collect();
        Self {
            id: Uuid::now_v7(),
            turns: Arc::new(turns),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
