use super::models::RunStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Streaming events, serialized as `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    LlmResponseStart {
        iteration: usize,
    },
    LlmResponse {
        text: String,
    },
    LlmResponseStop {
        iteration: usize,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolOutput {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    Error {
        message: String,
    },
    RunComplete {
        status: RunStatus,
        final_response: String,
        session_id: String,
        iterations: usize,
    },
}

impl AgentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::LlmResponseStart { .. } => "llm_response_start",
            AgentEvent::LlmResponse { .. } => "llm_response",
            AgentEvent::LlmResponseStop { .. } => "llm_response_stop",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolOutput { .. } => "tool_output",
            AgentEvent::Error { .. } => "error",
            AgentEvent::RunComplete { .. } => "run_complete",
        }
    }

    /// One server-sent-events frame carrying this event.
    pub fn to_sse_frame(&self) -> String {
        let payload = serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"type":"error","data":{{"message":"unserializable event: {err}"}}}}"#)
        });
        format!("data: {payload}\n\n")
    }
}

pub type EventStream = ReceiverStream<AgentEvent>;

/// Where a run reports its events; a no-op for synchronous runs.
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<mpsc::Sender<AgentEvent>>,
}

impl EventSink {
    pub(crate) fn channel(sender: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.sender.is_some()
    }

    pub(crate) async fn emit(&self, event: AgentEvent) {
        if let Some(sender) = &self.sender {
            // a dropped consumer does not stop the run; history is still persisted
            let _ = sender.send(event).await;
        }
    }
}
