use crate::config::ConfigError;
use crate::infrastructure::model::ModelError;
use orrery_session::SessionStoreError;
use thiserror::Error;

/// Why a run ended in `error` status.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] SessionStoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("run cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(err) => err.user_message(),
            AgentError::Store(err) => err.user_message(),
            AgentError::Config(err) => err.to_string(),
            AgentError::Cancelled => "run cancelled".to_string(),
        }
    }
}
