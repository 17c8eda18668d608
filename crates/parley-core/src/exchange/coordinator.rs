//! Drives one streaming exchange from dispatch to a terminal state.
//!
//! The transport stream is consumed in order by a single task. Each
//! `Update` replaces the assistant turn's content with the cumulative
//! snapshot and republishes the session; the terminal event (finish,
//! error, or cancellation) finalizes the turn and clears the registry
//! entry.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use parley_types::chat::{ChatStat, ToolCall, TurnContent};
use parley_types::exchange::{ExchangeKey, ExchangeState};
use parley_types::llm::{CompletionRequest, LlmError, ResponseMeta, StreamEvent};

use crate::llm::box_provider::BoxLlmProvider;
use crate::session::{SessionHub, SessionStore};
use crate::token::estimate;

use super::registry::CancellationRegistry;

/// Caller-side view of a running exchange.
#[derive(Debug, Clone)]
pub struct ExchangeHandle {
    key: ExchangeKey,
    state: watch::Receiver<ExchangeState>,
}

impl ExchangeHandle {
    pub fn key(&self) -> ExchangeKey {
        self.key
    }

    pub fn state(&self) -> ExchangeState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn watch(&self) -> watch::Receiver<ExchangeState> {
        self.state.clone()
    }

    /// Wait for the exchange to reach a terminal state.
    pub async fn wait(mut self) -> ExchangeState {
        if let Ok(state) = self.state.wait_for(ExchangeState::is_terminal).await {
            return *state;
        }
        *self.state.borrow()
    }
}

/// Formats a transport error as the block appended to a failed turn.
pub fn error_block(message: &str) -> String {
    let body = serde_json::json!({
        "error": true,
        "message": message,
    });
    let pretty = serde_json::to_string_pretty(&body).unwrap_or_default();
    format!("\n\n```json\n{pretty}\n```")
}

fn record_usage(stats: &mut ChatStat, text: &str) {
    stats.char_count += text.chars().count() as u64;
    stats.word_count += text.split_whitespace().count() as u64;
    stats.token_count += estimate(text) as u64;
}

pub struct ExchangeCoordinator<S> {
    provider: Arc<BoxLlmProvider>,
    hub: SessionHub<S>,
    registry: CancellationRegistry,
}

impl<S> Clone for ExchangeCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            hub: self.hub.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<S: SessionStore> ExchangeCoordinator<S> {
    pub fn new(
        provider: Arc<BoxLlmProvider>,
        hub: SessionHub<S>,
        registry: CancellationRegistry,
    ) -> Self {
        Self {
            provider,
            hub,
            registry,
        }
    }

    /// Register the exchange and return its handle plus the future that
    /// drives it. The caller spawns the future.
    ///
    /// `key.turn_id` is the assistant turn receiving the reply;
    /// `user_turn_id` is flagged alongside it if the exchange fails.
    pub fn start(
        &self,
        key: ExchangeKey,
        user_turn_id: Uuid,
        request: CompletionRequest,
    ) -> (ExchangeHandle, BoxFuture<'static, ExchangeState>) {
        let token = self.registry.register(key);
        let (state_tx, state_rx) = watch::channel(ExchangeState::Pending);
        let this = self.clone();

        let span = info_span!(
            "gen_ai.chat",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = true,
            exchange = %key,
        );
        let drive = async move { this.drive(key, user_turn_id, request, token, state_tx).await }
            .instrument(span)
            .boxed();

        (
            ExchangeHandle {
                key,
                state: state_rx,
            },
            drive,
        )
    }

    async fn drive(
        self,
        key: ExchangeKey,
        user_turn_id: Uuid,
        request: CompletionRequest,
        token: CancellationToken,
        state_tx: watch::Sender<ExchangeState>,
    ) -> ExchangeState {
        let mut stream = self.provider.stream(request);

        let result: Result<(String, ResponseMeta), LlmError> = loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => break Err(LlmError::Aborted),
                next = stream.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => break Err(e),
                None => break Err(LlmError::Stream("stream ended before completion".to_string())),
            };

            if *state_tx.borrow() == ExchangeState::Pending {
                state_tx.send_replace(ExchangeState::Streaming);
            }

            match event {
                StreamEvent::Update { text } => self.apply_update(key, text),
                StreamEvent::ToolStarted(call) | StreamEvent::ToolFinished(call) => {
                    self.apply_tool_call(key, call)
                }
                StreamEvent::Finished { text, meta } => break Ok((text, meta)),
            }
        };
        // Dropping the stream aborts the transport request.
        drop(stream);

        let state = match result {
            Ok((text, meta)) => {
                self.complete(key, text, &meta).await;
                ExchangeState::Completed
            }
            Err(e) if e.is_abort() => {
                self.abort(key).await;
                ExchangeState::Aborted
            }
            Err(e) => {
                self.fail(key, user_turn_id, &e).await;
                ExchangeState::Errored
            }
        };

        self.registry.remove(&key);
        state_tx.send_replace(state);
        state
    }

    fn apply_update(&self, key: ExchangeKey, text: String) {
        if text.is_empty() {
            return;
        }
        let published = self.hub.publish(key.session_id, |s| {
            s.update_turn(key.turn_id, |t| t.content = TurnContent::Text(text))
        });
        if let Err(e) = published {
            debug!(exchange = %key, error = %e, "dropping update for closed session");
        }
    }

    fn apply_tool_call(&self, key: ExchangeKey, call: ToolCall) {
        debug!(exchange = %key, tool_call_id = %call.id, "tool call event");
        let published = self.hub.publish(key.session_id, |s| {
            s.update_turn(key.turn_id, |t| t.upsert_tool_call(call))
        });
        if let Err(e) = published {
            debug!(exchange = %key, error = %e, "dropping tool call for closed session");
        }
    }

    async fn complete(&self, key: ExchangeKey, text: String, meta: &ResponseMeta) {
        let updated = self
            .hub
            .update(key.session_id, |s| {
                let mut final_text = None;
                s.update_turn(key.turn_id, |t| {
                    if !text.is_empty() {
                        t.content = TurnContent::Text(text);
                    }
                    t.streaming = false;
                    t.timestamp = Utc::now();
                    final_text = Some(t.text().to_string());
                });
                if let Some(final_text) = &final_text {
                    record_usage(&mut s.stats, final_text);
                }
                final_text.is_some()
            })
            .await;

        match updated {
            Ok(true) => info!(
                exchange = %key,
                status = meta.status,
                gen_ai.usage.input_tokens = meta.usage.input_tokens,
                gen_ai.usage.output_tokens = meta.usage.output_tokens,
                "exchange completed"
            ),
            Ok(false) => warn!(exchange = %key, "completed turn no longer in session"),
            Err(e) => warn!(exchange = %key, error = %e, "failed to finalize turn"),
        }
    }

    async fn abort(&self, key: ExchangeKey) {
        let updated = self
            .hub
            .update(key.session_id, |s| {
                s.update_turn(key.turn_id, |t| t.streaming = false)
            })
            .await;
        if let Err(e) = updated {
            warn!(exchange = %key, error = %e, "failed to finalize aborted turn");
        }
        info!(exchange = %key, "exchange aborted");
    }

    async fn fail(&self, key: ExchangeKey, user_turn_id: Uuid, error: &LlmError) {
        let block = error_block(&error.to_string());
        let updated = self
            .hub
            .update(key.session_id, |s| {
                s.update_turns(|turns| {
                    for turn in turns.iter_mut() {
                        if turn.id == key.turn_id {
                            turn.content.append_text(&block);
                            turn.streaming = false;
                            turn.is_error = true;
                        } else if turn.id == user_turn_id {
                            turn.is_error = true;
                        }
                    }
                })
            })
            .await;
        if let Err(e) = updated {
            warn!(exchange = %key, error = %e, "failed to record exchange error");
        }
        warn!(exchange = %key, error = %error, "exchange failed");
    }
}
