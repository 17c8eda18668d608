//! In-memory implementation of [`SessionStore`].
//!
//! Sessions live for the lifetime of the process. Suitable for the CLI and
//! for tests; durable persistence is out of scope.

use dashmap::DashMap;
use uuid::Uuid;

use parley_core::session::SessionStore;
use parley_types::chat::Session;
use parley_types::error::RepositoryError;

/// `DashMap`-backed session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of every stored session, newest first.
    pub fn list_ids(&self) -> Vec<Uuid> {
        let mut entries: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| (entry.updated_at, *entry.key()))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, id)| id).collect()
    }
}

impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        self.sessions.insert(session.id, session.clone());
        tracing::trace!(session_id = %session.id, turns = session.turns.len(), "session saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::chat::{SessionConfig, Turn};

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let store = InMemorySessionStore::new();
        assert!(store.load(&Uuid::now_v7()).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new(SessionConfig::default());
        session.update_turns(|turns| turns.push(Turn::user("hello")));

        store.save(&session).await.unwrap();
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.turns.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_save_replaces_whole_session() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new(SessionConfig::default());
        store.save(&session).await.unwrap();

        session.topic = "Renamed".to_string();
        session.update_turns(|turns| turns.push(Turn::assistant("hi")));
        store.save(&session).await.unwrap();

        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.topic, "Renamed");
        assert_eq!(loaded.turns.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_ids_newest_first() {
        let store = InMemorySessionStore::new();
        let older = Session::new(SessionConfig::default());
        let mut newer = Session::new(SessionConfig::default());
        newer.updated_at = older.updated_at + chrono::Duration::seconds(5);

        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        assert_eq!(store.list_ids(), vec![newer.id, older.id]);
    }
}
