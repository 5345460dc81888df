use crate::error::SessionStoreError;
use crate::message::Message;
use crate::record::{
    RetentionPolicy, SessionPage, SessionQuery, SessionRecord, SessionSummary, apply_query,
    select_expired,
};
use crate::store::{SessionStore, ensure_session_id};
use async_trait::async_trait;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "json";

/// Durable store keeping one JSON document per session under `root`.
///
/// Writes go to a temporary file that is renamed over the record, so a
/// crash mid-write never leaves a truncated history behind.
#[derive(Debug)]
pub struct FileSessionStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| SessionStoreError::io(&root, source))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, session_id: &str) -> Result<PathBuf, SessionStoreError> {
        validate_file_id(session_id)?;
        Ok(self.root.join(format!("{session_id}.{RECORD_EXTENSION}")))
    }

    async fn read_record(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let path = self.record_path(session_id)?;
        read_record_at(&path, session_id).await
    }

    async fn write_record(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        let path = self.record_path(&record.session_id)?;
        let encoded = serde_json::to_vec_pretty(record).map_err(|source| {
            SessionStoreError::Serialization {
                session_id: record.session_id.clone(),
                source,
            }
        })?;
        let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        fs::write(&tmp, &encoded)
            .await
            .map_err(|source| SessionStoreError::io(&tmp, source))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| SessionStoreError::io(&path, source))?;
        Ok(())
    }

    async fn summaries(&self) -> Result<Vec<SessionSummary>, SessionStoreError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|source| SessionStoreError::io(&self.root, source))?;
        let mut summaries = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| SessionStoreError::io(&self.root, source))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match read_record_at(&path, session_id).await {
                Ok(Some(record)) => summaries.push(record.summary()),
                Ok(None) => {}
                Err(err) => {
                    warn!(path = %path.display(), %err, "Skipping unreadable session record");
                }
            }
        }
        Ok(summaries)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        let path = self.record_path(session_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SessionStoreError::io(&path, source)),
        }
    }
}

async fn read_record_at(
    path: &Path,
    session_id: &str,
) -> Result<Option<SessionRecord>, SessionStoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(SessionStoreError::io(path, source)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| SessionStoreError::Serialization {
            session_id: session_id.to_string(),
            source,
        })
}

fn validate_file_id(session_id: &str) -> Result<(), SessionStoreError> {
    ensure_session_id(session_id)?;
    let allowed = session_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if !allowed || session_id == "." || session_id == ".." {
        return Err(SessionStoreError::InvalidSessionId {
            session_id: session_id.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>, SessionStoreError> {
        Ok(self
            .read_record(session_id)
            .await?
            .map(|record| record.messages)
            .unwrap_or_default())
    }

    async fn append(
        &self,
        session_id: &str,
        agent_name: &str,
        messages: &[Message],
    ) -> Result<(), SessionStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .read_record(session_id)
            .await?
            .unwrap_or_else(|| SessionRecord::new(session_id, agent_name));
        record.append(messages);
        self.write_record(&record).await?;
        debug!(
            session_id,
            total_messages = record.messages.len(),
            "Persisted session record"
        );
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        let _guard = self.write_lock.lock().await;
        self.remove(session_id).await
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        self.read_record(session_id).await
    }

    async fn list(&self, query: &SessionQuery) -> Result<SessionPage, SessionStoreError> {
        Ok(apply_query(self.summaries().await?, query))
    }

    async fn cleanup(&self, policy: &RetentionPolicy) -> Result<usize, SessionStoreError> {
        let _guard = self.write_lock.lock().await;
        let expired = select_expired(&self.summaries().await?, policy, Utc::now());
        let mut removed = 0;
        for id in &expired {
            if self.remove(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
