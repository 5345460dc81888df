use crate::message::Message;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Persisted history of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub agent_name: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            agent_name: agent_name.into(),
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Messages are only ever appended, never reordered.
    pub fn append(&mut self, messages: &[Message]) {
        self.messages.extend_from_slice(messages);
        self.last_updated = Utc::now();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            agent_name: self.agent_name.clone(),
            message_count: self.messages.len(),
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub agent_name: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionQuery {
    pub agent: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl SessionQuery {
    pub fn for_agent(agent: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            ..Self::default()
        }
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    /// Number of sessions matching the filter before pagination.
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Option<Duration>,
    pub max_count: Option<usize>,
}

/// Filter, order (most recently updated first) and paginate summaries.
pub fn apply_query(mut summaries: Vec<SessionSummary>, query: &SessionQuery) -> SessionPage {
    if let Some(agent) = query.agent.as_deref() {
        summaries.retain(|summary| summary.agent_name == agent);
    }
    summaries.sort_by(|a, b| {
        b.last_updated
            .cmp(&a.last_updated)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    let total = summaries.len();
    let sessions = summaries
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();
    SessionPage { sessions, total }
}

/// Ids of sessions the policy evicts: anything older than `max_age`, then the
/// least recently updated beyond `max_count`.
pub fn select_expired(
    summaries: &[SessionSummary],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut ordered: Vec<&SessionSummary> = summaries.iter().collect();
    ordered.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

    let mut expired = Vec::new();
    let mut kept = 0usize;
    for summary in ordered {
        let too_old = policy
            .max_age
            .map(|age| now - summary.last_updated > age)
            .unwrap_or(false);
        let over_count = policy.max_count.map(|max| kept >= max).unwrap_or(false);
        if too_old || over_count {
            expired.push(summary.session_id.clone());
        } else {
            kept += 1;
        }
    }
    expired
}
