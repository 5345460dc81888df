use crate::domain::types::Message;
use serde::{Deserialize, Serialize};

/// Input of one engine run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Continue this session; a fresh id is generated when absent.
    pub session_id: Option<String>,
    pub user_message: String,
}

impl RunRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            user_message: user_message.into(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    MaxIterationsReached,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::MaxIterationsReached => "max_iterations_reached",
        }
    }
}

/// Structured outcome of a run; failures are a status, never a panic or hang.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub final_response: String,
    pub conversation_history: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub session_id: String,
    pub iterations: usize,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Conversation engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingModel,
    ExecutingTools,
    Done,
    Error,
    IterationLimitReached,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Done | EngineState::Error | EngineState::IterationLimitReached
        )
    }
}
