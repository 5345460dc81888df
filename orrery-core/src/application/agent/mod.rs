//! # Agent Module
//!
//! The conversation engine: a bounded loop in which a model picks tools,
//! the tool host executes them and the results are fed back.
//!
//! ## Key Types
//!
//! - [`ConversationEngine`] - drives runs, synchronously or as an event stream
//! - [`RunRequest`] / [`RunResult`] - input and structured outcome of a run
//! - [`AgentEvent`] - streaming events in emission order
//! - [`CancelHandle`] - cooperative cancellation between turns
//!
//! ## Agent Loop
//!
//! 1. Send history, system prompt and visible tools to the model
//! 2. No tool calls in the reply: done
//! 3. Otherwise run every call concurrently and append the results
//! 4. Repeat until done, an error, or `max_iterations` turns

mod context;
mod engine;
mod errors;
mod events;
mod models;


pub use engine::{CancelHandle, ConversationEngine};
pub use errors::AgentError;
pub use events::{AgentEvent, EventStream};
pub use models::{EngineState, RunRequest, RunResult, RunStatus};
