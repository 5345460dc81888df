use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("invalid session id '{session_id}'")]
    InvalidSessionId { session_id: String },
    #[error("session storage I/O failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to (de)serialize session '{session_id}': {source}")]
    Serialization {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SessionStoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            SessionStoreError::InvalidSessionId { session_id } => {
                format!("Session id '{session_id}' is not valid.")
            }
            SessionStoreError::Io { .. } => "Session history storage is unavailable.".to_string(),
            SessionStoreError::Serialization { session_id, .. } => {
                format!("Stored history for session '{session_id}' is corrupted.")
            }
        }
    }
}
