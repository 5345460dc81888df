use crate::error::SessionStoreError;
use crate::message::Message;
use crate::record::{RetentionPolicy, SessionPage, SessionQuery, SessionRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Pluggable persistence for conversation history.
///
/// Backends must be interchangeable: the conversation engine only ever talks
/// to this trait. Concurrent runs against the same session id are not
/// serialized by the store; callers serialize runs per session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Ordered history of the session; empty when the id is unknown.
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, SessionStoreError>;

    /// Append messages, creating the record on first use.
    async fn append(
        &self,
        session_id: &str,
        agent_name: &str,
        messages: &[Message],
    ) -> Result<(), SessionStoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, session_id: &str) -> Result<bool, SessionStoreError>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionStoreError>;

    async fn list(&self, query: &SessionQuery) -> Result<SessionPage, SessionStoreError>;

    /// Apply a retention policy, returning the number of sessions removed.
    async fn cleanup(&self, policy: &RetentionPolicy) -> Result<usize, SessionStoreError>;
}

pub type SessionStoreRef = Arc<dyn SessionStore>;

pub(crate) fn ensure_session_id(session_id: &str) -> Result<(), SessionStoreError> {
    if session_id.trim().is_empty() {
        return Err(SessionStoreError::InvalidSessionId {
            session_id: session_id.to_string(),
        });
    }
    Ok(())
}
