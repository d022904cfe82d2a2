//! In-process session store

use super::SessionStore;
use crate::error::Result;
use crate::types::{ChatSession, SessionId, SessionSummary};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Session store kept in memory; contents are lost on exit
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, ChatSession>>,
    max_sessions: usize,
}

impl MemorySessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: SessionId) -> Result<Option<ChatSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn put(&self, session: &ChatSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session.clone());

        while sessions.len() > self.max_sessions {
            let oldest = sessions
                .values()
                .min_by_key(|s| s.timestamp)
                .map(|s| s.id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<()> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(ChatSession::summary)
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, MessageKind};
    use chrono::{Duration, Utc};

    fn session_at(minutes_ago: i64, text: &str) -> ChatSession {
        let mut session = ChatSession::new();
        session.push(Message::user(text, MessageKind::Text));
        session.timestamp = Utc::now() - Duration::minutes(minutes_ago);
        session
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemorySessionStore::default();
        let session = session_at(0, "hello");

        store.put(&session).await.unwrap();
        assert_eq!(store.get(session.id).await.unwrap(), Some(session.clone()));

        store.delete(session.id).await.unwrap();
        assert!(store.get(session.id).await.unwrap().is_none());
        // deleting twice is fine
        store.delete(session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_evicts_oldest() {
        let store = MemorySessionStore::new(2);
        let oldest = session_at(30, "oldest");
        let middle = session_at(20, "middle");
        let newest = session_at(10, "newest");

        store.put(&oldest).await.unwrap();
        store.put(&middle).await.unwrap();
        store.put(&newest).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "newest");
        assert_eq!(listed[1].title, "middle");
        assert!(store.get(oldest.id).await.unwrap().is_none());
    }
}
