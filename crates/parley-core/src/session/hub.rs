//! Live session snapshots with a single serialized update path.
//!
//! Each open session lives in a `watch` channel of `Arc<Session>`. Every
//! mutation runs under `send_modify`, which serializes writers and
//! publishes the new snapshot to all subscribers. Readers only ever see
//! whole snapshots.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_types::chat::Session;
use parley_types::error::ChatError;

use super::store::SessionStore;

type SessionSender = Arc<watch::Sender<Arc<Session>>>;

/// Registry of open sessions, writing through to a [`SessionStore`].
///
/// Cloning produces a shared view of the same sessions.
pub struct SessionHub<S> {
    sessions: Arc<DashMap<Uuid, SessionSender>>,
    store: Arc<S>,
}

impl<S> Clone for SessionHub<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SessionStore> SessionHub<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            store,
        }
    }

    /// Persist a new session and open it.
    pub async fn insert(&self, session: Session) -> Result<Arc<Session>, ChatError> {
        self.store.save(&session).await?;
        let snapshot = Arc::new(session);
        let (tx, _rx) = watch::channel(Arc::clone(&snapshot));
        self.sessions.insert(snapshot.id, Arc::new(tx));
        debug!(session_id = %snapshot.id, "session opened");
        Ok(snapshot)
    }

    /// Open a session, loading it from the store if it is not live yet.
    pub async fn open(&self, session_id: Uuid) -> Result<Arc<Session>, ChatError> {
        if let Some(snapshot) = self.snapshot(session_id) {
            return Ok(snapshot);
        }
        let session = self
            .store
            .load(&session_id)
            .await?
            .ok_or(ChatError::SessionNotFound(session_id))?;
        let snapshot = Arc::new(session);
        // A concurrent open may have won the race; keep its channel.
        let sender = self
            .sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(watch::channel(Arc::clone(&snapshot)).0))
            .value()
            .clone();
        let current = sender.borrow().clone();
        Ok(current)
    }

    /// Current snapshot of an open session.
    pub fn snapshot(&self, session_id: Uuid) -> Option<Arc<Session>> {
        self.sender(session_id).map(|tx| tx.borrow().clone())
    }

    /// Receive every snapshot published for the session from now on.
    pub fn subscribe(&self, session_id: Uuid) -> Option<watch::Receiver<Arc<Session>>> {
        self.sender(session_id).map(|tx| tx.subscribe())
    }

    pub fn is_open(&self, session_id: Uuid) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Stop tracking a session. The stored copy is kept.
    pub fn close(&self, session_id: Uuid) -> bool {
        self.sessions.remove(&session_id).is_some()
    }

    /// Apply `edit` to the latest snapshot and publish the result, without
    /// persisting it.
    pub fn publish<R>(
        &self,
        session_id: Uuid,
        edit: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, ChatError> {
        let tx = self
            .sender(session_id)
            .ok_or(ChatError::SessionNotFound(session_id))?;
        let mut output = None;
        tx.send_modify(|current| {
            let mut next = Session::clone(current);
            output = Some(edit(&mut next));
            *current = Arc::new(next);
        });
        output.ok_or(ChatError::SessionNotFound(session_id))
    }

    /// Apply `edit` to the latest snapshot, publish it, and write it
    /// through to the store.
    pub async fn update<R>(
        &self,
        session_id: Uuid,
        edit: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, ChatError> {
        let output = self.publish(session_id, edit)?;
        self.persist(session_id).await?;
        Ok(output)
    }

    /// Write the latest snapshot to the store.
    pub async fn persist(&self, session_id: Uuid) -> Result<(), ChatError> {
        let Some(snapshot) = self.snapshot(session_id) else {
            warn!(session_id = %session_id, "persist requested for a closed session");
            return Err(ChatError::SessionNotFound(session_id));
        };
        self.store.save(&snapshot).await?;
        Ok(())
    }

    // Clone the sender out so no DashMap guard outlives this call.
    fn sender(&self, session_id: Uuid) -> Option<SessionSender> {
        self.sessions.get(&session_id).map(|r| Arc::clone(r.value()))
    }
}

#[cfg(test)]
mod tests {
    use parley_types::chat::{SessionConfig, Turn};

    use super::*;
    use crate::test_support::MemoryStore;

    fn hub() -> (SessionHub<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (SessionHub::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn test_insert_persists_and_opens() {
        let (hub, store) = hub();
        let session = hub.insert(Session::new(SessionConfig::default())).await.unwrap();

        assert!(hub.is_open(session.id));
        assert!(store.get(session.id).is_some());
    }

    #[tokio::test]
    async fn test_open_loads_from_store() {
        let (hub, store) = hub();
        let session = Session::new(SessionConfig::default());
        let id = session.id;
        store.put(session);

        let opened = hub.open(id).await.unwrap();
        assert_eq!(opened.id, id);
        assert!(hub.is_open(id));
    }

    #[tokio::test]
    async fn test_open_unknown_session() {
        let (hub, _) = hub();
        let err = hub.open(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_publishes_new_snapshot() {
        let (hub, store) = hub();
        let session = hub.insert(Session::new(SessionConfig::default())).await.unwrap();
        let mut rx = hub.subscribe(session.id).unwrap();

        hub.update(session.id, |s| s.update_turns(|t| t.push(Turn::user("hi"))))
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.turn_count(), 1);
        assert!(!Arc::ptr_eq(&latest.turns, &session.turns));
        assert_eq!(store.get(session.id).unwrap().turn_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_does_not_persist() {
        let (hub, store) = hub();
        let session = hub.insert(Session::new(SessionConfig::default())).await.unwrap();

        hub.publish(session.id, |s| s.topic = "draft".to_string()).unwrap();

        assert_eq!(hub.snapshot(session.id).unwrap().topic, "draft");
        assert_ne!(store.get(session.id).unwrap().topic, "draft");
    }

    #[tokio::test]
    async fn test_update_closed_session() {
        let (hub, _) = hub();
        let session = hub.insert(Session::new(SessionConfig::default())).await.unwrap();
        assert!(hub.close(session.id));

        let err = hub.update(session.id, |_| ()).await.unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let (hub, _) = hub();
        let session = hub.insert(Session::new(SessionConfig::default())).await.unwrap();
        let session_id = session.id;

        let mut handles = Vec::new();
        for i in 0..20 {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                hub.update(session_id, |s| {
                    s.update_turns(|t| t.push(Turn::user(format!("m{i}"))))
                })
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(hub.snapshot(session_id).unwrap().turn_count(), 20);
    }
}
