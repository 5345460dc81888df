use super::error::WorkflowError;
use crate::application::agent::{ConversationEngine, RunRequest, RunResult};
use crate::application::tooling::{CallerContext, HostError, ToolServerInterface};
use crate::config::AgentConfig;
use crate::domain::types::CallResult;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The narrow surface handed to orchestration code.
///
/// Direct tool calls go out under the context's [`CallerContext`];
/// agents run through [`WorkflowContext::run_agent`] use their own scope.
#[derive(Clone)]
pub struct WorkflowContext {
    engine: ConversationEngine,
    caller: CallerContext,
}

impl WorkflowContext {
    pub fn new(engine: ConversationEngine) -> Self {
        Self {
            engine,
            caller: CallerContext::unrestricted(),
        }
    }

    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }

    /// Restrict direct tool calls to what `agent` may see.
    pub fn scoped_to(self, agent: &AgentConfig) -> Self {
        self.with_caller(CallerContext::from_agent(agent))
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    pub fn host(&self) -> &Arc<dyn ToolServerInterface> {
        self.engine.host()
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    pub async fn run_agent(&self, agent: &AgentConfig, input: impl Into<String>) -> RunResult {
        self.engine.run(agent, RunRequest::new(input)).await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallResult, HostError> {
        self.engine
            .host()
            .invoke_tool(name, arguments, &self.caller)
            .await
    }
}

/// Caller-supplied workflow logic: produces an output or fails.
#[async_trait]
pub trait Orchestration: Send + Sync {
    async fn run(&self, context: WorkflowContext, input: String) -> Result<String, WorkflowError>;
}

struct FnOrchestration<F>(F);

#[async_trait]
impl<F, Fut> Orchestration for FnOrchestration<F>
where
    F: Fn(WorkflowContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, WorkflowError>> + Send + 'static,
{
    async fn run(&self, context: WorkflowContext, input: String) -> Result<String, WorkflowError> {
        (self.0)(context, input).await
    }
}

/// Wrap an async closure as an [`Orchestration`].
pub fn orchestration_fn<F, Fut>(f: F) -> Arc<dyn Orchestration>
where
    F: Fn(WorkflowContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, WorkflowError>> + Send + 'static,
{
    Arc::new(FnOrchestration(f))
}

/// Runs an [`Orchestration`] in its own task, optionally under a deadline.
pub struct DynamicWorkflow {
    engine: ConversationEngine,
    orchestration: Arc<dyn Orchestration>,
    timeout: Option<Duration>,
    caller: CallerContext,
}

impl DynamicWorkflow {
    pub fn new(engine: ConversationEngine, orchestration: Arc<dyn Orchestration>) -> Self {
        Self {
            engine,
            orchestration,
            timeout: None,
            caller: CallerContext::unrestricted(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Scope the tool calls the orchestration makes through its context.
    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }

    pub async fn run(&self, input: impl Into<String>) -> Result<String, WorkflowError> {
        let context = WorkflowContext::new(self.engine.clone()).with_caller(self.caller.clone());
        let orchestration = Arc::clone(&self.orchestration);
        let input = input.into();
        let mut handle = tokio::spawn(async move { orchestration.run(context, input).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    warn!(timeout = ?limit, "orchestration timed out");
                    return Err(WorkflowError::TimedOut { timeout: limit });
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(outcome) => {
                info!(success = outcome.is_ok(), "orchestration finished");
                outcome
            }
            Err(err) if err.is_panic() => {
                let payload = err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|text| text.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(%message, "orchestration panicked");
                Err(WorkflowError::Panicked { message })
            }
            Err(err) => Err(WorkflowError::orchestration(err.to_string())),
        }
    }
}
