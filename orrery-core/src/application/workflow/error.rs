use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow has no steps")]
    EmptySequence,
    #[error("step {index} ('{agent}') failed: {message}")]
    StepFailed {
        index: usize,
        agent: String,
        message: String,
    },
    #[error("orchestration failed: {message}")]
    Orchestration { message: String },
    #[error("orchestration panicked: {message}")]
    Panicked { message: String },
    #[error("orchestration did not finish within {timeout:?}")]
    TimedOut { timeout: Duration },
}

impl WorkflowError {
    pub fn orchestration(message: impl Into<String>) -> Self {
        Self::Orchestration {
            message: message.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::StepFailed { index, agent, .. } => {
                format!("Workflow stopped at step {} ({agent}).", index + 1)
            }
            WorkflowError::TimedOut { timeout } => {
                format!("Workflow did not finish within {}s.", timeout.as_secs())
            }
            other => other.to_string(),
        }
    }
}
