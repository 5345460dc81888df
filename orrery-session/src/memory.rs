use crate::error::SessionStoreError;
use crate::message::Message;
use crate::record::{
    RetentionPolicy, SessionPage, SessionQuery, SessionRecord, SessionSummary, apply_query,
    select_expired,
};
use crate::store::{SessionStore, ensure_session_id};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local session cache. History is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|record| record.messages.clone())
            .unwrap_or_default())
    }

    async fn append(
        &self,
        session_id: &str,
        agent_name: &str,
        messages: &[Message],
    ) -> Result<(), SessionStoreError> {
        ensure_session_id(session_id)?;
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(session_id, agent_name));
        record.append(messages);
        debug!(
            session_id,
            total_messages = record.messages.len(),
            "Appended messages to in-memory session"
        );
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn list(&self, query: &SessionQuery) -> Result<SessionPage, SessionStoreError> {
        let summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(SessionRecord::summary)
            .collect();
        Ok(apply_query(summaries, query))
    }

    async fn cleanup(&self, policy: &RetentionPolicy) -> Result<usize, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        let summaries: Vec<SessionSummary> =
            sessions.values().map(SessionRecord::summary).collect();
        let expired = select_expired(&summaries, policy, Utc::now());
        for id in &expired {
            sessions.remove(id);
        }
        Ok(expired.len())
    }
}
