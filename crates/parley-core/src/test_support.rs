//! In-process fakes shared by unit tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{Stream, StreamExt, stream};
use tokio::sync::Semaphore;
use uuid::Uuid;

use parley_types::chat::Session;
use parley_types::error::RepositoryError;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ResponseMeta, StreamEvent,
};

use crate::llm::provider::LlmProvider;
use crate::session::SessionStore;

#[derive(Default)]
pub(crate) struct MemoryStore {
    sessions: DashMap<Uuid, Session>,
}

impl MemoryStore {
    pub(crate) fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.get(&id).map(|r| r.value().clone())
    }

    pub(crate) fn put(&self, session: Session) {
        self.sessions.insert(session.id, session);
    }
}

impl SessionStore for MemoryStore {
    async fn load(&self, session_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        Ok(self.get(*session_id))
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        self.put(session.clone());
        Ok(())
    }
}

struct Script {
    events: Vec<Result<StreamEvent, LlmError>>,
    hang: bool,
}

#[derive(Default)]
struct FakeState {
    replies: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
    complete_calls: AtomicUsize,
    gate: Option<Semaphore>,
}

/// Scripted transport. `complete` pops queued replies (default: a short
/// summary); `stream` pops queued event scripts (default: finish "ok").
#[derive(Clone, Default)]
pub(crate) struct FakeProvider {
    state: Arc<FakeState>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block every `complete` call until [`FakeProvider::release`].
    pub(crate) fn gated(self) -> Self {
        Self {
            state: Arc::new(FakeState {
                gate: Some(Semaphore::new(0)),
                ..FakeState::default()
            }),
        }
    }

    pub(crate) fn release(&self, calls: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(calls);
        }
    }

    pub(crate) fn push_reply(&self, reply: Result<CompletionResponse, LlmError>) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_script(&self, events: Vec<Result<StreamEvent, LlmError>>) {
        self.state
            .scripts
            .lock()
            .unwrap()
            .push_back(Script { events, hang: false });
    }

    /// Like `push_script`, but the stream never ends after its events.
    pub(crate) fn push_hanging_script(&self, events: Vec<Result<StreamEvent, LlmError>>) {
        self.state
            .scripts
            .lock()
            .unwrap()
            .push_back(Script { events, hang: true });
    }

    pub(crate) fn complete_calls(&self) -> usize {
        self.state.complete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub(crate) async fn wait_for_complete_calls(&self, calls: usize) {
        while self.complete_calls() < calls {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl LlmProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.state.requests.lock().unwrap().push(request.clone());
        self.state.complete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.state.gate {
            gate.acquire().await.unwrap().forget();
        }
        let reply = self.state.replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| {
            Ok(CompletionResponse {
                content: "A short summary".to_string(),
                meta: ResponseMeta::ok(),
            })
        })
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        self.state.requests.lock().unwrap().push(request);
        let script = self.state.scripts.lock().unwrap().pop_front().unwrap_or(Script {
            events: vec![Ok(StreamEvent::Finished {
                text: "ok".to_string(),
                meta: ResponseMeta::ok(),
            })],
            hang: false,
        });
        let events = stream::iter(script.events);
        if script.hang {
            events.chain(stream::pending()).boxed()
        } else {
            events.boxed()
        }
    }
}
