//! SessionStore trait definition.
//!
//! The engine reads and replaces whole sessions by id; it never persists
//! anything directly. Follows the RPITIT repository pattern.

use parley_types::chat::Session;
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for session persistence.
///
/// Implementations live in parley-infra (e.g., `InMemorySessionStore`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait SessionStore: Send + Sync + 'static {
    /// Get a session by its unique ID.
    fn load(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Insert or replace a session.
    fn save(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
