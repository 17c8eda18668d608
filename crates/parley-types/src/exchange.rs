//! Exchange identity and lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one in-flight exchange: the session and the assistant turn
/// being produced.
///
/// Holds ids only, never session data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeKey {
    pub session_id: Uuid,
    pub turn_id: Uuid,
}

impl ExchangeKey {
    pub fn new(session_id: Uuid, turn_id: Uuid) -> Self {
        Self {
            session_id,
            turn_id,
        }
    }
}

impl fmt::Display for ExchangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.turn_id)
    }
}

/// Lifecycle of an exchange.
///
/// `Pending -> Streaming -> {Completed | Errored | Aborted}`. A stream that
/// fails before its first event goes straight from `Pending` to a terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    Pending,
    Streaming,
    Completed,
    Errored,
    Aborted,
}

impl ExchangeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExchangeState::Completed | ExchangeState::Errored | ExchangeState::Aborted
        )
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeState::Pending => write!(f, "pending"),
            ExchangeState::Streaming => write!(f, "streaming"),
            ExchangeState::Completed => write!(f, "completed"),
            ExchangeState::Errored => write!(f, "errored"),
            ExchangeState::Aborted => write!(f, "aborted"),
        }
    }
}
