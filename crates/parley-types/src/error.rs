use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;

/// Errors from session store operations (used by the trait in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors returned to callers of the chat engine.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("turn {0} not found")]
    TurnNotFound(Uuid),

    #[error("empty input")]
    EmptyInput,

    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Failures of background work (compaction and title derivation).
///
/// These are logged, never surfaced to the user.
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("transport error: {0}")]
    Transport(#[from] LlmError),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("session update failed: {0}")]
    Session(#[from] ChatError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_chat_error_from_repository() {
        let err: ChatError = RepositoryError::NotFound.into();
        assert_eq!(err.to_string(), "store error: entity not found");
    }

    #[test]
    fn test_background_error_from_chat() {
        let id = Uuid::nil();
        let err: BackgroundError = ChatError::SessionNotFound(id).into();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_background_error_from_llm() {
        let err: BackgroundError = LlmError::AuthenticationFailed.into();
        assert_eq!(err.to_string(), "transport error: authentication failed");
    }
}
