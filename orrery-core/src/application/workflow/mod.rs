//! Multi-agent workflows on top of the conversation engine.
//!
//! - [`SequentialWorkflow`] pipes each step's final answer into the next step
//! - [`DynamicWorkflow`] runs caller-supplied orchestration code in its own task

mod dynamic;
mod error;
mod sequential;

pub use dynamic::{DynamicWorkflow, Orchestration, WorkflowContext, orchestration_fn};
pub use error::WorkflowError;
pub use sequential::{SequentialWorkflow, StepOutcome, WorkflowOutcome, WorkflowStatus};
