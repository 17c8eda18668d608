//! Summary compaction of older turns into the rolling memory.
//!
//! After a turn completes, everything not yet summarized (and not cleared)
//! is measured. Once it crosses the session's threshold, the pending turns
//! plus the previous summary are sent to the model with a summarize
//! instruction, and the reply replaces the rolling memory wholesale.

use std::sync::Arc;

use dashmap::DashSet;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use parley_types::chat::{RollingMemory, Session, Turn};
use parley_types::error::BackgroundError;
use parley_types::llm::CompletionRequest;

use crate::llm::box_provider::BoxLlmProvider;
use crate::session::{SessionHub, SessionStore};
use crate::token::estimate_turns;

use super::{InFlightGuard, summary_turn};

/// Instruction appended to the compaction request.
pub const SUMMARIZE_INSTRUCTION: &str =
    "Summarize the discussion briefly in 200 words or less to use as a prompt for future context.";

/// A compaction that is due, ready to send.
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    /// Previous summary (if any), pending turns, then the instruction.
    pub messages: Vec<Turn>,
    /// Estimate of the pending turns alone.
    pub pending_tokens: usize,
    /// Turn count when compaction was triggered; becomes the new
    /// `last_summarized_index` on commit.
    pub pre_call_turn_count: usize,
    /// Session timeline when compaction was triggered.
    pub timeline: u64,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    Committed { last_summarized_index: usize },
    NotNeeded,
    AlreadyRunning,
    /// The session moved on (reset or a newer summary) before the reply.
    Stale,
    /// The summarization call failed; the failure was logged.
    Failed,
}

/// Decide whether `session` needs compacting.
///
/// `force` skips the threshold and memory-sending checks but still needs
/// at least one pending turn.
pub fn plan_compaction(session: &Session, force: bool) -> Option<CompactionPlan> {
    let config = &session.config;
    let turn_count = session.turn_count();
    let start = session
        .rolling_memory
        .last_summarized_index
        .max(session.manual_clear_index)
        .min(turn_count);

    // Slice by position first so `start` keeps indexing the raw turn list.
    let mut pending: Vec<Turn> = session.turns[start..]
        .iter()
        .filter(|t| !t.is_error)
        .cloned()
        .collect();
    if pending.is_empty() {
        return None;
    }

    let pending_tokens = estimate_turns(&pending);
    if pending_tokens > config.max_tokens {
        let keep_from = pending.len().saturating_sub(config.history_message_count);
        pending.drain(..keep_from);
    }

    let due = pending_tokens > config.compress_message_length_threshold && config.send_memory;
    if !due && !force {
        return None;
    }

    let mut messages = Vec::with_capacity(pending.len() + 2);
    messages.extend(summary_turn(&session.rolling_memory));
    messages.extend(pending);
    messages.push(Turn::system(SUMMARIZE_INSTRUCTION));

    Some(CompactionPlan {
        messages,
        pending_tokens,
        pre_call_turn_count: turn_count,
        timeline: session.timeline,
        model: config.summary_model().to_string(),
    })
}

/// Install a new summary unless the session has moved past `pre_call_turn_count`.
///
/// Returns `false` (leaving the memory untouched) when a newer summary
/// already covers more turns or the session was reset since `timeline`
/// was captured.
pub fn commit_summary(
    session: &mut Session,
    summary: String,
    pre_call_turn_count: usize,
    timeline: u64,
) -> bool {
    if session.timeline != timeline
        || pre_call_turn_count < session.rolling_memory.last_summarized_index
        || pre_call_turn_count > session.turn_count()
    {
        return false;
    }
    session.rolling_memory = RollingMemory {
        summary,
        last_summarized_index: pre_call_turn_count,
    };
    session.touch();
    true
}

/// Runs at most one compaction per session at a time.
pub struct CompactionScheduler<S> {
    provider: Arc<BoxLlmProvider>,
    hub: SessionHub<S>,
    in_flight: Arc<DashSet<Uuid>>,
}

impl<S> Clone for CompactionScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            hub: self.hub.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S: SessionStore> CompactionScheduler<S> {
    pub fn new(provider: Arc<BoxLlmProvider>, hub: SessionHub<S>) -> Self {
        Self {
            provider,
            hub,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.in_flight.contains(&session_id)
    }

    /// Spawn a compaction for the session if one is due and none is running.
    ///
    /// Failures are logged; the rolling memory keeps its last committed value.
    pub fn trigger(&self, session_id: Uuid) -> Option<JoinHandle<()>> {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight, session_id) else {
            debug!(session_id = %session_id, "compaction already in flight");
            return None;
        };
        let snapshot = self.hub.snapshot(session_id)?;
        let plan = plan_compaction(&snapshot, false)?;

        let this = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            match this.execute(session_id, plan).await {
                Ok(outcome) => debug!(session_id = %session_id, ?outcome, "compaction finished"),
                Err(e) => warn!(session_id = %session_id, error = %e, "compaction failed"),
            }
        }))
    }

    /// Compact now, ignoring the threshold, and wait for the result.
    pub async fn compact_now(&self, session_id: Uuid) -> Result<CompactionOutcome, BackgroundError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, session_id) else {
            return Ok(CompactionOutcome::AlreadyRunning);
        };
        let snapshot = self.hub.open(session_id).await?;
        let Some(plan) = plan_compaction(&snapshot, true) else {
            return Ok(CompactionOutcome::NotNeeded);
        };
        self.execute(session_id, plan).await
    }

    async fn execute(
        &self,
        session_id: Uuid,
        plan: CompactionPlan,
    ) -> Result<CompactionOutcome, BackgroundError> {
        let request = CompletionRequest::from_turns(plan.model.clone(), &plan.messages, false);

        let span = info_span!(
            "gen_ai.summarize_context",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            session_id = %session_id,
            pending_tokens = plan.pending_tokens,
            message_count = plan.messages.len(),
        );

        let response = self.provider.complete(&request).instrument(span).await?;
        if !response.meta.is_success() {
            return Err(BackgroundError::Status(response.meta.status));
        }
        let summary = response.content.trim().to_string();
        if summary.is_empty() {
            return Err(BackgroundError::EmptyResponse);
        }

        let pre_call = plan.pre_call_turn_count;
        let timeline = plan.timeline;
        let committed = self
            .hub
            .update(session_id, |s| commit_summary(s, summary, pre_call, timeline))
            .await?;

        if committed {
            info!(
                session_id = %session_id,
                last_summarized_index = pre_call,
                "rolling memory replaced"
            );
            Ok(CompactionOutcome::Committed {
                last_summarized_index: pre_call,
            })
        } else {
            warn!(
                session_id = %session_id,
                pre_call_turn_count = pre_call,
                "discarding stale summary"
            );
            Ok(CompactionOutcome::Stale)
        }
    }
}

#[cfg(test)]
mod tests {
    use parley_types::chat::{MessageRole, SessionConfig};
    use parley_types::llm::{CompletionResponse, LlmError, ResponseMeta};

    use super::*;
    use crate::memory::SUMMARY_PREFIX;
    use crate::test_support::{FakeProvider, MemoryStore};

    // 100 letters = 25 tokens
    fn chunk() -> String {
        "abcd".repeat(25)
    }

    fn config(threshold: usize) -> SessionConfig {
        SessionConfig {
            compress_message_length_threshold: threshold,
            ..SessionConfig::default()
        }
    }

    fn session_with_turns(count: usize, threshold: usize) -> Session {
        let mut session = Session::new(config(threshold));
        session.update_turns(|turns| {
            for i in 0..count {
                let role = if i % 2 == 0 {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                };
                turns.push(Turn::new(role, chunk()));
            }
        });
        session
    }

    async fn setup(session: Session, provider: &FakeProvider) -> (CompactionScheduler<MemoryStore>, SessionHub<MemoryStore>, Uuid) {
        let hub = SessionHub::new(Arc::new(MemoryStore::default()));
        let session = hub.insert(session).await.unwrap();
        let scheduler = CompactionScheduler::new(Arc::new(BoxLlmProvider::new(provider.clone())), hub.clone());
        (scheduler, hub, session.id)
    }

    #[test]
    fn test_plan_below_threshold() {
        let session = session_with_turns(4, 1000);
        assert!(plan_compaction(&session, false).is_none());
    }

    #[test]
    fn test_plan_over_threshold() {
        let session = session_with_turns(4, 50);
        let plan = plan_compaction(&session, false).unwrap();

        assert_eq!(plan.pending_tokens, 100);
        assert_eq!(plan.pre_call_turn_count, 4);
        assert_eq!(plan.messages.len(), 5);
        assert_eq!(plan.messages[4].text(), SUMMARIZE_INSTRUCTION);
        assert_eq!(plan.messages[4].role, MessageRole::System);
    }

    #[test]
    fn test_plan_respects_send_memory() {
        let mut session = session_with_turns(4, 50);
        session.config.send_memory = false;
        assert!(plan_compaction(&session, false).is_none());
        assert!(plan_compaction(&session, true).is_some());
    }

    #[test]
    fn test_plan_starts_after_summary_and_clear() {
        let mut session = session_with_turns(8, 10);
        session.rolling_memory = RollingMemory {
            summary: "prior".to_string(),
            last_summarized_index: 3,
        };
        session.manual_clear_index = 5;
        let plan = plan_compaction(&session, false).unwrap();

        // summary + turns 5..8 + instruction
        assert_eq!(plan.messages.len(), 5);
        assert!(plan.messages[0].text().starts_with(SUMMARY_PREFIX));
        assert_eq!(plan.pending_tokens, 75);
    }

    #[test]
    fn test_summary_does_not_count_toward_threshold() {
        let mut session = session_with_turns(2, 60);
        session.rolling_memory = RollingMemory {
            summary: "x".repeat(1000),
            last_summarized_index: 1,
        };
        // one pending turn of 25 tokens, far below 60 despite a long summary
        assert!(plan_compaction(&session, false).is_none());
    }

    #[test]
    fn test_plan_skips_error_turns() {
        let mut session = session_with_turns(4, 60);
        session.update_turns(|turns| turns[1].is_error = true);
        // 3 * 25 = 75 > 60
        let plan = plan_compaction(&session, false).unwrap();
        assert_eq!(plan.pending_tokens, 75);
        assert_eq!(plan.messages.len(), 4);
    }

    #[test]
    fn test_plan_truncates_to_lookback_over_max_context() {
        let mut session = session_with_turns(10, 10);
        session.config.max_tokens = 100;
        session.config.history_message_count = 3;
        let plan = plan_compaction(&session, false).unwrap();

        assert_eq!(plan.pending_tokens, 250);
        assert_eq!(plan.messages.len(), 4);
    }

    #[test]
    fn test_plan_uses_compress_model() {
        let mut session = session_with_turns(4, 10);
        session.config.compress_model = Some("cheap/model".to_string());
        assert_eq!(plan_compaction(&session, false).unwrap().model, "cheap/model");
    }

    #[test]
    fn test_commit_never_lowers_index() {
        let mut session = session_with_turns(6, 10);
        session.rolling_memory = RollingMemory {
            summary: "newer".to_string(),
            last_summarized_index: 6,
        };
        let timeline = session.timeline;
        assert!(!commit_summary(&mut session, "older".to_string(), 4, timeline));
        assert_eq!(session.rolling_memory.summary, "newer");
        assert_eq!(session.rolling_memory.last_summarized_index, 6);
    }

    #[test]
    fn test_commit_rejects_index_past_end() {
        let mut session = session_with_turns(6, 10);
        let timeline = session.timeline;
        session.reset();
        assert!(!commit_summary(&mut session, "s".to_string(), 6, timeline));
        assert!(!session.rolling_memory.has_summary());
    }

    #[test]
    fn test_commit_rejects_summary_from_before_reset() {
        let mut session = session_with_turns(4, 10);
        let timeline = session.timeline;
        session.reset();
        session.update_turns(|turns| {
            for _ in 0..5 {
                turns.push(Turn::user(chunk()));
            }
        });

        assert!(!commit_summary(&mut session, "old timeline".to_string(), 4, timeline));
        assert!(!session.rolling_memory.has_summary());
        assert_eq!(session.rolling_memory.last_summarized_index, 0);
    }

    #[test]
    fn test_commit_replaces_wholesale() {
        let mut session = session_with_turns(6, 10);
        session.rolling_memory = RollingMemory {
            summary: "first".to_string(),
            last_summarized_index: 2,
        };
        let timeline = session.timeline;
        assert!(commit_summary(&mut session, "second".to_string(), 6, timeline));
        assert_eq!(
            session.rolling_memory,
            RollingMemory {
                summary: "second".to_string(),
                last_summarized_index: 6,
            }
        );
    }

    #[tokio::test]
    async fn test_trigger_commits_summary() {
        let provider = FakeProvider::new();
        provider.push_reply(Ok(CompletionResponse {
            content: "  the gist  ".to_string(),
            meta: ResponseMeta::ok(),
        }));
        let (scheduler, hub, id) = setup(session_with_turns(4, 50), &provider).await;

        scheduler.trigger(id).unwrap().await.unwrap();

        let session = hub.snapshot(id).unwrap();
        assert_eq!(session.rolling_memory.summary, "the gist");
        assert_eq!(session.rolling_memory.last_summarized_index, 4);
        assert!(!scheduler.is_running(id));
    }

    #[tokio::test]
    async fn test_trigger_below_threshold_makes_no_call() {
        let provider = FakeProvider::new();
        let (scheduler, _hub, id) = setup(session_with_turns(2, 1000), &provider).await;

        assert!(scheduler.trigger(id).is_none());
        assert_eq!(provider.complete_calls(), 0);
        assert!(!scheduler.is_running(id));
    }

    #[tokio::test]
    async fn test_concurrent_triggers_issue_one_call() {
        let provider = FakeProvider::new().gated();
        let (scheduler, hub, id) = setup(session_with_turns(4, 50), &provider).await;

        let first = scheduler.trigger(id).unwrap();
        hub.update(id, |s| s.update_turns(|t| t.push(Turn::user(chunk()))))
            .await
            .unwrap();
        assert!(scheduler.trigger(id).is_none());

        provider.wait_for_complete_calls(1).await;
        provider.release(1);
        first.await.unwrap();

        assert_eq!(provider.complete_calls(), 1);
        let session = hub.snapshot(id).unwrap();
        assert_eq!(session.rolling_memory.last_summarized_index, 4);
    }

    #[tokio::test]
    async fn test_reset_during_call_discards_summary() {
        let provider = FakeProvider::new().gated();
        let (scheduler, hub, id) = setup(session_with_turns(4, 50), &provider).await;

        let running = scheduler.trigger(id).unwrap();
        provider.wait_for_complete_calls(1).await;
        hub.update(id, |s| {
            s.reset();
            s.update_turns(|t| {
                for _ in 0..5 {
                    t.push(Turn::user(chunk()));
                }
            });
        })
        .await
        .unwrap();
        provider.release(1);
        running.await.unwrap();

        let session = hub.snapshot(id).unwrap();
        assert!(!session.rolling_memory.has_summary());
        assert_eq!(session.rolling_memory.last_summarized_index, 0);
        assert_eq!(session.turn_count(), 5);
    }

    #[tokio::test]
    async fn test_failure_leaves_memory_untouched() {
        let provider = FakeProvider::new();
        provider.push_reply(Err(LlmError::Provider {
            message: "HTTP 500".to_string(),
        }));
        let mut session = session_with_turns(4, 50);
        session.rolling_memory = RollingMemory {
            summary: "kept".to_string(),
            last_summarized_index: 1,
        };
        let (scheduler, hub, id) = setup(session, &provider).await;

        scheduler.trigger(id).unwrap().await.unwrap();

        let session = hub.snapshot(id).unwrap();
        assert_eq!(session.rolling_memory.summary, "kept");
        assert_eq!(session.rolling_memory.last_summarized_index, 1);
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let provider = FakeProvider::new();
        provider.push_reply(Ok(CompletionResponse {
            content: "partial".to_string(),
            meta: ResponseMeta {
                status: 503,
                ..ResponseMeta::ok()
            },
        }));
        let (scheduler, hub, id) = setup(session_with_turns(4, 10), &provider).await;

        let err = scheduler.compact_now(id).await.unwrap_err();
        assert!(matches!(err, BackgroundError::Status(503)));
        assert!(!hub.snapshot(id).unwrap().rolling_memory.has_summary());
    }

    #[tokio::test]
    async fn test_compact_now_ignores_threshold() {
        let provider = FakeProvider::new();
        let (scheduler, hub, id) = setup(session_with_turns(2, 1000), &provider).await;

        let outcome = scheduler.compact_now(id).await.unwrap();
        assert_eq!(
            outcome,
            CompactionOutcome::Committed {
                last_summarized_index: 2
            }
        );
        assert!(hub.snapshot(id).unwrap().rolling_memory.has_summary());
    }

    #[tokio::test]
    async fn test_reset_during_compaction_discards_result() {
        let provider = FakeProvider::new().gated();
        let (scheduler, hub, id) = setup(session_with_turns(4, 50), &provider).await;

        let handle = scheduler.trigger(id).unwrap();
        provider.wait_for_complete_calls(1).await;
        hub.update(id, |s| s.reset()).await.unwrap();
        provider.release(1);
        handle.await.unwrap();

        let session = hub.snapshot(id).unwrap();
        assert!(!session.rolling_memory.has_summary());
        assert_eq!(session.rolling_memory.last_summarized_index, 0);
    }
}
