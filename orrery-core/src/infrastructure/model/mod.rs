//! Model provider seam
//!
//! The engine talks to language models only through [`ModelProvider`];
//! vendor clients live outside this crate.

mod traits;
mod types;

pub use traits::{ModelProvider, ModelStream};
pub use types::{ModelChunk, ModelError, ModelRequest, ModelResponse, ToolSpec};
