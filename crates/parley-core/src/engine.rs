//! Chat engine facade.
//!
//! `ChatEngine` wires the session hub, the exchange coordinator, and the
//! background memory tasks together behind the operations a front end
//! calls: submit a user turn, cancel an exchange, force a title or a
//! compaction, and manage session lifecycles.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::chat::{ContentPart, Session, SessionConfig, Turn, TurnContent};
use parley_types::error::{BackgroundError, ChatError};
use parley_types::exchange::{ExchangeKey, ExchangeState};
use parley_types::llm::CompletionRequest;

use crate::context::{AssemblyOptions, EngineContext, TemplateVars, assemble, fill_template};
use crate::exchange::{CancellationRegistry, ExchangeCoordinator, ExchangeHandle};
use crate::llm::box_provider::BoxLlmProvider;
use crate::memory::{CompactionOutcome, CompactionScheduler, TitleDeriver, TitleOutcome};
use crate::session::{SessionHub, SessionStore};

/// A user submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub text: String,
    /// Image URLs sent as multimodal parts after the text.
    pub attachments: Vec<String>,
    /// A tool result carried back to the model; skips the input template.
    pub is_tool_reply: bool,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn tool_reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_tool_reply: true,
            ..Self::default()
        }
    }
}

struct EngineInner<S> {
    ctx: EngineContext,
    hub: SessionHub<S>,
    registry: CancellationRegistry,
    coordinator: ExchangeCoordinator<S>,
    compaction: CompactionScheduler<S>,
    titles: TitleDeriver<S>,
}

impl<S: SessionStore> EngineInner<S> {
    /// Post-completion hooks: title first, then compaction. Both detach.
    fn after_completion(&self, session_id: Uuid) {
        self.titles.trigger(session_id, &self.ctx);
        self.compaction.trigger(session_id);
    }
}

/// The conversation engine. Cloning shares the same sessions and tasks.
pub struct ChatEngine<S> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for ChatEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SessionStore> ChatEngine<S> {
    pub fn new(ctx: EngineContext, provider: BoxLlmProvider, store: Arc<S>) -> Self {
        let provider = Arc::new(provider);
        let hub = SessionHub::new(store);
        let registry = CancellationRegistry::new();
        Self {
            inner: Arc::new(EngineInner {
                coordinator: ExchangeCoordinator::new(
                    Arc::clone(&provider),
                    hub.clone(),
                    registry.clone(),
                ),
                compaction: CompactionScheduler::new(Arc::clone(&provider), hub.clone()),
                titles: TitleDeriver::new(provider, hub.clone()),
                ctx,
                hub,
                registry,
            }),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.inner.ctx
    }

    pub fn registry(&self) -> &CancellationRegistry {
        &self.inner.registry
    }

    pub async fn create_session(&self, config: SessionConfig) -> Result<Arc<Session>, ChatError> {
        let session = self.inner.hub.insert(Session::new(config)).await?;
        info!(session_id = %session.id, model = %session.config.model, "session created");
        Ok(session)
    }

    pub async fn open_session(&self, session_id: Uuid) -> Result<Arc<Session>, ChatError> {
        self.inner.hub.open(session_id).await
    }

    /// Latest snapshot of an open session.
    pub fn session(&self, session_id: Uuid) -> Option<Arc<Session>> {
        self.inner.hub.snapshot(session_id)
    }

    pub fn subscribe(&self, session_id: Uuid) -> Option<watch::Receiver<Arc<Session>>> {
        self.inner.hub.subscribe(session_id)
    }

    /// Exclude everything so far from future requests.
    pub async fn clear_context(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.inner.hub.open(session_id).await?;
        self.inner.hub.update(session_id, |s| s.clear_context()).await
    }

    /// Cancel in-flight exchanges, then drop all turns and the rolling memory.
    pub async fn reset_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.inner.hub.open(session_id).await?;
        let cancelled = self.inner.registry.cancel_session(session_id);
        if cancelled > 0 {
            debug!(session_id = %session_id, cancelled, "cancelled exchanges before reset");
        }
        self.inner.hub.update(session_id, |s| s.reset()).await
    }

    pub async fn fork_session(&self, session_id: Uuid) -> Result<Arc<Session>, ChatError> {
        let source = self.inner.hub.open(session_id).await?;
        let forked = self.inner.hub.insert(source.fork()).await?;
        info!(session_id = %session_id, fork_id = %forked.id, "session forked");
        Ok(forked)
    }

    pub async fn set_pinned_context(&self, session_id: Uuid, turns: Vec<Turn>) -> Result<(), ChatError> {
        self.inner.hub.open(session_id).await?;
        self.inner
            .hub
            .update(session_id, |s| {
                s.pinned_context = turns;
                s.touch();
            })
            .await
    }

    /// Append a user turn and a streaming assistant placeholder, then start
    /// the exchange that fills the placeholder.
    ///
    /// Returns once the exchange is dispatched. On completion, title
    /// derivation and compaction are consulted in the background.
    pub async fn submit_user_turn(
        &self,
        session_id: Uuid,
        input: UserInput,
    ) -> Result<ExchangeHandle, ChatError> {
        if input.text.trim().is_empty() && input.attachments.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        let snapshot = self.inner.hub.open(session_id).await?;
        let ctx = &self.inner.ctx;

        let text = if input.is_tool_reply {
            input.text
        } else {
            let vars = TemplateVars::for_session(ctx, &snapshot.config);
            fill_template(&snapshot.config.input_template, &input.text, &vars)
        };
        let content = if input.attachments.is_empty() {
            TurnContent::Text(text)
        } else {
            let mut parts = vec![ContentPart::Text { text }];
            parts.extend(input.attachments.into_iter().map(|url| ContentPart::ImageUrl { url }));
            TurnContent::Parts(parts)
        };

        let mut user_turn = Turn::user(content);
        user_turn.is_tool_reply = input.is_tool_reply;
        let user_turn_id = user_turn.id;
        let reply = Turn::pending_reply(snapshot.config.model.clone());
        let key = ExchangeKey::new(session_id, reply.id);

        let (assembled, request) = self
            .inner
            .hub
            .update(session_id, |s| {
                // The window is drawn from prior history; the new input rides on top.
                let options = AssemblyOptions::for_session(s, ctx);
                let mut assembled = assemble(s, &options, ctx);
                assembled.turns.push(user_turn.clone());
                s.update_turns(|turns| {
                    turns.push(user_turn);
                    turns.push(reply);
                });
                let request = CompletionRequest::from_turns(s.config.model.clone(), &assembled.turns, true)
                    .with_temperature(s.config.temperature);
                (assembled, request)
            })
            .await?;

        debug!(
            session_id = %session_id,
            considered = assembled.stats.considered,
            included = assembled.stats.included,
            skipped_errors = assembled.stats.skipped_errors,
            window_tokens = assembled.stats.window_tokens,
            context_start = assembled.stats.context_start,
            summary_included = assembled.stats.summary_included,
            messages = assembled.turns.len(),
            "context assembled"
        );

        let (handle, drive) = self.inner.coordinator.start(key, user_turn_id, request);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if drive.await == ExchangeState::Completed {
                inner.after_completion(session_id);
            }
        });

        Ok(handle)
    }

    /// Cancel the exchange producing `turn_id`. Returns `false` when nothing
    /// is in flight under that identity.
    pub fn cancel_exchange(&self, session_id: Uuid, turn_id: Uuid) -> bool {
        self.inner
            .registry
            .cancel(&ExchangeKey::new(session_id, turn_id))
    }

    /// Request a new topic now, whatever the current topic or length.
    pub async fn force_retitle(&self, session_id: Uuid) -> Result<TitleOutcome, ChatError> {
        self.inner.hub.open(session_id).await?;
        match self.inner.titles.derive_now(session_id).await {
            Ok(outcome) => Ok(outcome),
            Err(BackgroundError::Session(e)) => Err(e),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "forced retitle failed");
                Ok(TitleOutcome::Failed)
            }
        }
    }

    /// Summarize all pending turns now, ignoring the threshold.
    pub async fn force_compaction(&self, session_id: Uuid) -> Result<CompactionOutcome, ChatError> {
        self.inner.hub.open(session_id).await?;
        match self.inner.compaction.compact_now(session_id).await {
            Ok(outcome) => Ok(outcome),
            Err(BackgroundError::Session(e)) => Err(e),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "forced compaction failed");
                Ok(CompactionOutcome::Failed)
            }
        }
    }
}
