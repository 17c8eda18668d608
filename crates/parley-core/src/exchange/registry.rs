//! Cancellation handles for in-flight exchanges.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use parley_types::exchange::ExchangeKey;

/// Maps an exchange identity to its cancel handle.
///
/// Holds only ids and tokens; cloning produces a shared view.
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<DashMap<ExchangeKey, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for `key`, replacing (and cancelling) any
    /// stale entry under the same key.
    pub fn register(&self, key: ExchangeKey) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.tokens.insert(key, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Signal cancellation. Returns `false` if no exchange is registered.
    pub fn cancel(&self, key: &ExchangeKey) -> bool {
        // Clone out so the guard is released before cancel runs wakers.
        let token = self.tokens.get(key).map(|r| r.value().clone());
        match token {
            Some(token) => {
                debug!(exchange = %key, "cancelling exchange");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `key`. Safe to call from every terminal path.
    pub fn remove(&self, key: &ExchangeKey) -> bool {
        self.tokens.remove(key).is_some()
    }

    /// Cancel every exchange of a session.
    pub fn cancel_session(&self, session_id: uuid::Uuid) -> usize {
        let tokens: Vec<CancellationToken> = self
            .tokens
            .iter()
            .filter(|r| r.key().session_id == session_id)
            .map(|r| r.value().clone())
            .collect();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    pub fn contains(&self, key: &ExchangeKey) -> bool {
        self.tokens.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
