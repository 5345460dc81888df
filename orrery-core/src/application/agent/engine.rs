use super::context::{compose_system_prompt, tool_specs};
use super::errors::AgentError;
use super::events::{AgentEvent, EventSink, EventStream};
use super::models::{EngineState, RunRequest, RunResult, RunStatus};
use crate::application::tooling::{CallerContext, ToolServerInterface};
use crate::config::AgentConfig;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::domain::types::{Message, MessageRole, ToolCall, ToolResult};
use crate::infrastructure::model::{ModelChunk, ModelProvider, ModelRequest, ModelResponse};
use futures::StreamExt;
use orrery_session::{SessionStoreRef, new_session_id};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Cooperative cancellation for a run, observed between turns.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.flag.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Drives one bounded model/tool conversation per run.
#[derive(Clone)]
pub struct ConversationEngine {
    host: Arc<dyn ToolServerInterface>,
    provider: Arc<dyn ModelProvider>,
    store: SessionStoreRef,
}

/// How the turn loop ended.
struct LoopOutcome {
    state: EngineState,
    error: Option<AgentError>,
}

impl ConversationEngine {
    pub fn new(
        host: Arc<dyn ToolServerInterface>,
        provider: Arc<dyn ModelProvider>,
        store: SessionStoreRef,
    ) -> Self {
        Self {
            host,
            provider,
            store,
        }
    }

    pub fn host(&self) -> &Arc<dyn ToolServerInterface> {
        &self.host
    }

    pub fn store(&self) -> &SessionStoreRef {
        &self.store
    }

    pub async fn run(&self, agent: &AgentConfig, request: RunRequest) -> RunResult {
        self.run_with_cancel(agent, request, CancelHandle::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        agent: &AgentConfig,
        request: RunRequest,
        cancel: CancelHandle,
    ) -> RunResult {
        self.drive(agent, request, &cancel, &EventSink::default())
            .await
    }

    pub fn run_streaming(&self, agent: AgentConfig, request: RunRequest) -> EventStream {
        self.run_streaming_with_cancel(agent, request, CancelHandle::new())
    }

    /// Spawn the run and stream its events; the stream closes after
    /// `run_complete`.
    pub fn run_streaming_with_cancel(
        &self,
        agent: AgentConfig,
        request: RunRequest,
        cancel: CancelHandle,
    ) -> EventStream {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let engine = self.clone();
        tokio::spawn(async move {
            let sink = EventSink::channel(sender);
            engine.drive(&agent, request, &cancel, &sink).await;
        });
        ReceiverStream::new(receiver)
    }

    async fn drive(
        &self,
        agent: &AgentConfig,
        request: RunRequest,
        cancel: &CancelHandle,
        sink: &EventSink,
    ) -> RunResult {
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_session_id);
        info!(agent = %agent.name, session_id = %session_id, "run started");

        let mut history = Vec::new();
        let mut produced = vec![Message::user(request.user_message)];
        let mut iterations = 0;

        let outcome = match self.prepare(agent, &session_id).await {
            Ok(loaded) => {
                history = loaded;
                self.turn_loop(
                    agent,
                    &session_id,
                    &history,
                    &mut produced,
                    &mut iterations,
                    cancel,
                    sink,
                )
                .await
            }
            Err(error) => LoopOutcome {
                state: EngineState::Error,
                error: Some(error),
            },
        };

        let mut error = outcome.error;
        if let Err(err) = self.store.append(&session_id, &agent.name, &produced).await {
            warn!(session_id = %session_id, %err, "failed to persist session history");
            error.get_or_insert(AgentError::Store(err));
        }

        let status = match (outcome.state, &error) {
            (_, Some(_)) => RunStatus::Error,
            (EngineState::IterationLimitReached, None) => RunStatus::MaxIterationsReached,
            _ => RunStatus::Success,
        };
        let final_response = produced
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Assistant)
            .map(Message::text)
            .unwrap_or_default();
        let error_message = error.as_ref().map(AgentError::user_message);

        if let Some(message) = &error_message {
            sink.emit(AgentEvent::Error {
                message: message.clone(),
            })
            .await;
        }
        sink.emit(AgentEvent::RunComplete {
            status,
            final_response: final_response.clone(),
            session_id: session_id.clone(),
            iterations,
        })
        .await;
        info!(
            agent = %agent.name,
            session_id = %session_id,
            status = status.as_str(),
            iterations,
            "run finished"
        );

        history.extend(produced);
        RunResult {
            status,
            final_response,
            conversation_history: history,
            error_message,
            session_id,
            iterations,
        }
    }

    async fn prepare(&self, agent: &AgentConfig, session_id: &str) -> Result<Vec<Message>, AgentError> {
        agent.validate()?;
        if !agent.include_history {
            return Ok(Vec::new());
        }
        let history = self.store.load(session_id).await?;
        debug!(session_id, messages = history.len(), "loaded session history");
        Ok(history)
    }

    #[allow(clippy::too_many_arguments)]
    async fn turn_loop(
        &self,
        agent: &AgentConfig,
        session_id: &str,
        history: &[Message],
        produced: &mut Vec<Message>,
        iterations: &mut usize,
        cancel: &CancelHandle,
        sink: &EventSink,
    ) -> LoopOutcome {
        let caller = CallerContext::from_agent(agent);
        let system_prompt = compose_system_prompt(self.host.as_ref(), agent, &caller).await;
        let mut state = EngineState::Idle;

        while !state.is_terminal() {
            state = match state {
                EngineState::Idle | EngineState::ExecutingTools => {
                    if cancel.is_cancelled() {
                        info!(session_id, iteration = *iterations, "run cancelled");
                        return LoopOutcome {
                            state: EngineState::Error,
                            error: Some(AgentError::Cancelled),
                        };
                    }
                    if *iterations >= agent.max_iterations {
                        warn!(session_id, max_iterations = agent.max_iterations, "iteration limit reached");
                        EngineState::IterationLimitReached
                    } else {
                        EngineState::AwaitingModel
                    }
                }
                EngineState::AwaitingModel => {
                    *iterations += 1;
                    let iteration = *iterations;
                    let request = ModelRequest {
                        params: agent.llm_params.clone(),
                        system_prompt: system_prompt.clone(),
                        messages: history.iter().chain(produced.iter()).cloned().collect(),
                        tools: tool_specs(self.host.as_ref(), &caller).await,
                        session_id: Some(session_id.to_string()),
                    };
                    debug!(session_id, iteration, tools = request.tools.len(), "awaiting model");
                    let response = match self.ask_model(request, iteration, sink).await {
                        Ok(response) => response,
                        Err(err) => {
                            warn!(session_id, iteration, %err, "model call failed");
                            return LoopOutcome {
                                state: EngineState::Error,
                                error: Some(err),
                            };
                        }
                    };

                    if response.tool_calls.is_empty() {
                        produced.push(Message::assistant(response.content));
                        EngineState::Done
                    } else {
                        let calls = normalize_call_ids(response.tool_calls, iteration);
                        produced.push(Message::assistant_with_calls(response.content, calls.clone()));
                        let results = self.execute_tools(calls, &caller, sink).await;
                        produced.push(Message::tool_results(results));
                        EngineState::ExecutingTools
                    }
                }
                terminal => terminal,
            };
        }

        LoopOutcome { state, error: None }
    }

    async fn ask_model(
        &self,
        request: ModelRequest,
        iteration: usize,
        sink: &EventSink,
    ) -> Result<ModelResponse, AgentError> {
        if !sink.is_streaming() {
            return Ok(self.provider.chat(request).await?);
        }

        let mut stream = self.provider.chat_stream(request).await?;
        sink.emit(AgentEvent::LlmResponseStart { iteration }).await;
        let mut response = ModelResponse::default();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                ModelChunk::Text(text) => {
                    response.content.push_str(&text);
                    sink.emit(AgentEvent::LlmResponse { text }).await;
                }
                ModelChunk::ToolCall(call) => response.tool_calls.push(call),
            }
        }
        sink.emit(AgentEvent::LlmResponseStop { iteration }).await;
        Ok(response)
    }

    /// Run every call of a turn concurrently; each failure becomes an error
    /// result instead of ending the run.
    async fn execute_tools(
        &self,
        calls: Vec<ToolCall>,
        caller: &CallerContext,
        sink: &EventSink,
    ) -> Vec<ToolResult> {
        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let host = Arc::clone(&self.host);
                let caller = caller.clone();
                let name = call.name.clone();
                let arguments = call.arguments.clone();
                tokio::spawn(async move { host.invoke_tool(&name, arguments, &caller).await })
            })
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for (call, handle) in calls.into_iter().zip(handles) {
            sink.emit(AgentEvent::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .await;

            let result = match handle.await {
                Ok(Ok(output)) => ToolResult {
                    call_id: call.id.clone(),
                    content: output.text(),
                    is_error: output.is_error,
                },
                Ok(Err(err)) => {
                    warn!(tool = %call.name, %err, "tool call failed");
                    ToolResult::failure(call.id.clone(), err.user_message())
                }
                Err(join_error) => {
                    warn!(tool = %call.name, %join_error, "tool task aborted");
                    ToolResult::failure(call.id.clone(), format!("tool task failed: {join_error}"))
                }
            };

            sink.emit(AgentEvent::ToolOutput {
                id: call.id.clone(),
                name: call.name.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            })
            .await;
            results.push(result);
        }
        results
    }
}

/// Give id-less calls a stable id so results can be paired with them.
fn normalize_call_ids(calls: Vec<ToolCall>, iteration: usize) -> Vec<ToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(index, mut call)| {
            if call.id.trim().is_empty() {
                call.id = format!("call_{iteration}_{index}");
            }
            call
        })
        .collect()
}
