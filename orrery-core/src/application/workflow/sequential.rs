use super::error::WorkflowError;
use crate::application::agent::{ConversationEngine, RunRequest, RunStatus};
use crate::config::AgentConfig;
use orrery_session::new_session_id;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub agent: String,
    pub input: String,
    pub output: String,
    pub status: RunStatus,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Steps that ran, in order; completed steps are never rolled back.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub status: WorkflowStatus,
    pub steps: Vec<StepOutcome>,
    pub final_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
}

impl WorkflowOutcome {
    /// The outcome as an error when a step failed.
    pub fn into_result(self) -> Result<Self, WorkflowError> {
        let Some(index) = self.failed_step else {
            return Ok(self);
        };
        let step = self.steps.get(index);
        Err(WorkflowError::StepFailed {
            index,
            agent: step.map(|step| step.agent.clone()).unwrap_or_default(),
            message: step
                .and_then(|step| step.error_message.clone())
                .unwrap_or_else(|| {
                    step.map(|step| step.status.as_str().to_string())
                        .unwrap_or_default()
                }),
        })
    }
}

/// Runs agents in order, threading each final answer into the next input.
pub struct SequentialWorkflow {
    engine: ConversationEngine,
    steps: Vec<AgentConfig>,
    share_session: bool,
}

impl SequentialWorkflow {
    pub fn new(engine: ConversationEngine, steps: Vec<AgentConfig>) -> Self {
        Self {
            engine,
            steps,
            share_session: false,
        }
    }

    /// Run every step in one session instead of a fresh one per step.
    pub fn with_shared_session(mut self, share: bool) -> Self {
        self.share_session = share;
        self
    }

    pub async fn run(&self, input: impl Into<String>) -> Result<WorkflowOutcome, WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::EmptySequence);
        }
        let shared = self.share_session.then(new_session_id);
        let mut current = input.into();
        let mut steps = Vec::with_capacity(self.steps.len());

        for (index, agent) in self.steps.iter().enumerate() {
            let mut request = RunRequest::new(current.clone());
            request.session_id = shared.clone();
            let result = self.engine.run(agent, request).await;
            info!(step = index, agent = %agent.name, status = result.status.as_str(), "workflow step finished");

            let succeeded = result.status == RunStatus::Success;
            steps.push(StepOutcome {
                index,
                agent: agent.name.clone(),
                input: current,
                output: result.final_response.clone(),
                status: result.status,
                session_id: result.session_id,
                error_message: result.error_message,
            });
            if !succeeded {
                warn!(step = index, agent = %agent.name, "workflow halted");
                let final_output = steps
                    .iter()
                    .rev()
                    .find(|step| step.status == RunStatus::Success)
                    .map(|step| step.output.clone())
                    .unwrap_or_default();
                return Ok(WorkflowOutcome {
                    status: WorkflowStatus::Failed,
                    steps,
                    final_output,
                    failed_step: Some(index),
                });
            }
            current = result.final_response;
        }

        Ok(WorkflowOutcome {
            status: WorkflowStatus::Completed,
            steps,
            final_output: current,
            failed_step: None,
        })
    }
}
