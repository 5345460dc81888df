//! # Orrery Session
//!
//! Conversation history for the Orrery execution core.
//!
//! - [`message`] - the append-only message model shared with the engine
//! - [`record`] - persisted session records, listing and retention helpers
//! - [`store`] - the pluggable [`SessionStore`] interface
//! - [`memory`] / [`file`] - interchangeable in-memory and durable backends

pub mod error;
pub mod file;
pub mod memory;
pub mod message;
pub mod record;
pub mod store;

pub use error::SessionStoreError;
pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;
pub use message::{ContentBlock, Message, MessageContent, MessageRole, ToolCall, ToolResult};
pub use record::{RetentionPolicy, SessionPage, SessionQuery, SessionRecord, SessionSummary};
pub use store::{SessionStore, SessionStoreRef};

/// Generate a fresh session identifier.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
