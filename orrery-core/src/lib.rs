//! # Orrery Core
//!
//! Tool-host and agent-execution core: live connections to tool servers,
//! a filtered capability registry, and a bounded conversation loop that lets
//! a model call those capabilities.
//!
//! ```no_run
//! # async fn demo(provider: std::sync::Arc<dyn orrery_core::model::ModelProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! use orrery_core::{ConversationEngine, HostOptions, OrreryConfig, RunRequest, ToolHost};
//! use std::sync::Arc;
//!
//! let config = OrreryConfig::load(None)?;
//! let host = ToolHost::new(HostOptions::from_config(&config));
//! host.register_all(&config).await?;
//!
//! let store = Arc::new(orrery_session::InMemorySessionStore::new());
//! let engine = ConversationEngine::new(Arc::new(host.clone()), provider, store);
//! if let Some(agent) = config.agent("assistant") {
//!     let result = engine.run(agent, RunRequest::new("weather in Paris?")).await;
//!     println!("{}", result.final_response);
//! }
//! host.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use application::{agent, tooling, workflow};
pub use domain::types;
pub use infrastructure::model;

pub use agent::{
    AgentError, AgentEvent, CancelHandle, ConversationEngine, EngineState, EventStream,
    RunRequest, RunResult, RunStatus,
};
pub use config::{
    AgentConfig, ConfigError, LlmParams, OrreryConfig, RootScope, ServerConfig, ServerScope,
    TransportConfig, TransportKind,
};
pub use tooling::{
    CallerContext, HostError, HostOptions, HostStatus, ServerStatus, ToolHost, ToolInvokeError,
    ToolServerInterface,
};
pub use types::{CallResult, CapabilityDescriptor, CapabilityKind, ContentItem};
pub use workflow::{
    DynamicWorkflow, Orchestration, SequentialWorkflow, WorkflowContext, WorkflowError,
    WorkflowOutcome, orchestration_fn,
};
