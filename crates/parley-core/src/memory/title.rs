//! Session topic derivation via LLM.
//!
//! Once a conversation still carrying the placeholder topic is long enough,
//! the most recent turns are sent with a short "give me a title"
//! instruction. The reply is trimmed of quotes, markdown emphasis, and
//! trailing punctuation before it becomes the topic.

use std::sync::Arc;

use dashmap::DashSet;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use parley_types::chat::{Session, Turn};
use parley_types::error::BackgroundError;
use parley_types::llm::CompletionRequest;

use crate::context::EngineContext;
use crate::llm::box_provider::BoxLlmProvider;
use crate::session::{SessionHub, SessionStore};
use crate::token::estimate_turns;

use super::InFlightGuard;

/// Estimated conversation size at which a title is first requested.
pub const TITLE_MIN_TOKENS: usize = 50;

/// Instruction appended to the title request.
pub const TOPIC_INSTRUCTION: &str = "Please generate a four to five word title summarizing our \
conversation without any lead-in, punctuation, quotation marks, periods, symbols, bold text, or \
additional text. Remove enclosing quotation marks.";

const QUOTES: &[char] = &['"', '\'', '“', '”', '*'];
const TRAILING: &[char] = &['，', '。', '！', '？', '、', ',', '.', '!', '?', '"', '\'', '“', '”', '*'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleOutcome {
    Titled(String),
    /// The model returned nothing usable; the topic was kept.
    Unchanged,
    NotNeeded,
    AlreadyRunning,
    /// The title call failed; the failure was logged.
    Failed,
}

/// Clean a model-produced title.
pub fn trim_topic(raw: &str) -> String {
    raw.trim()
        .trim_matches(QUOTES)
        .trim_end_matches(TRAILING)
        .trim()
        .to_string()
}

/// Whether an automatic title should be requested for `session`.
pub fn should_auto_title(session: &Session, ctx: &EngineContext) -> bool {
    ctx.enable_auto_title
        && session.has_default_topic()
        && estimate_turns(session.turns.iter()) >= TITLE_MIN_TOKENS
}

/// The most recent `history_message_count` turns plus the instruction.
///
/// Falls back to the last turn when the lookback would select nothing.
pub fn title_messages(session: &Session) -> Option<Vec<Turn>> {
    let turn_count = session.turn_count();
    if turn_count == 0 {
        return None;
    }
    let mut start = turn_count.saturating_sub(session.config.history_message_count);
    if start >= turn_count {
        start = turn_count - 1;
    }

    let mut messages: Vec<Turn> = session.turns[start..].to_vec();
    messages.push(Turn::user(TOPIC_INSTRUCTION));
    Some(messages)
}

/// Requests titles, at most one call per session at a time.
pub struct TitleDeriver<S> {
    provider: Arc<BoxLlmProvider>,
    hub: SessionHub<S>,
    in_flight: Arc<DashSet<Uuid>>,
}

impl<S> Clone for TitleDeriver<S> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            hub: self.hub.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S: SessionStore> TitleDeriver<S> {
    pub fn new(provider: Arc<BoxLlmProvider>, hub: SessionHub<S>) -> Self {
        Self {
            provider,
            hub,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Spawn a title request if the session qualifies for an automatic one.
    pub fn trigger(&self, session_id: Uuid, ctx: &EngineContext) -> Option<JoinHandle<()>> {
        let snapshot = self.hub.snapshot(session_id)?;
        if !should_auto_title(&snapshot, ctx) {
            return None;
        }
        let guard = InFlightGuard::acquire(&self.in_flight, session_id)?;
        let messages = title_messages(&snapshot)?;
        let model = snapshot.config.summary_model().to_string();

        let this = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            match this.execute(session_id, model, messages, false).await {
                Ok(outcome) => debug!(session_id = %session_id, ?outcome, "title derivation finished"),
                Err(e) => warn!(session_id = %session_id, error = %e, "title derivation failed"),
            }
        }))
    }

    /// Request a title regardless of length, topic, or the auto-title flag.
    pub async fn derive_now(&self, session_id: Uuid) -> Result<TitleOutcome, BackgroundError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, session_id) else {
            return Ok(TitleOutcome::AlreadyRunning);
        };
        let snapshot = self.hub.open(session_id).await?;
        let Some(messages) = title_messages(&snapshot) else {
            return Ok(TitleOutcome::NotNeeded);
        };
        let model = snapshot.config.summary_model().to_string();
        self.execute(session_id, model, messages, true).await
    }

    #[tracing::instrument(
        name = "generate_title",
        skip_all,
        fields(session_id = %session_id, model = %model, forced = forced)
    )]
    async fn execute(
        &self,
        session_id: Uuid,
        model: String,
        messages: Vec<Turn>,
        forced: bool,
    ) -> Result<TitleOutcome, BackgroundError> {
        let request = CompletionRequest::from_turns(model, &messages, false);

        let span = info_span!(
            "gen_ai.generate_title",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
        );
        let response = self.provider.complete(&request).instrument(span).await?;
        if !response.meta.is_success() {
            return Err(BackgroundError::Status(response.meta.status));
        }

        let topic = trim_topic(&response.content);
        if topic.is_empty() {
            return Ok(TitleOutcome::Unchanged);
        }

        let applied = self
            .hub
            .update(session_id, |s| {
                // An automatic title never overwrites one set meanwhile.
                if !forced && !s.has_default_topic() {
                    return false;
                }
                s.topic = topic.clone();
                s.touch();
                true
            })
            .await?;

        if applied {
            info!(session_id = %session_id, topic = %topic, "session titled");
            Ok(TitleOutcome::Titled(topic))
        } else {
            Ok(TitleOutcome::Unchanged)
        }
    }
}
