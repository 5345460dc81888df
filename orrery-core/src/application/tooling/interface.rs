use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::error::{HostError, ToolInvokeError};
use super::filter::CallerContext;
use crate::domain::types::{CallResult, CapabilityDescriptor, CapabilityKind};

/// Something a transport observed that the host has to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ListChanged(CapabilityKind),
    Closed,
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// One physical connection to one tool server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its `result` payload.
    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError>;

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError>;

    fn is_alive(&self) -> bool;

    async fn close(&self);
}

/// Answers requests a server sends back to the client.
#[derive(Debug, Clone, Default)]
pub struct ClientResponder {
    roots: Arc<Vec<PathBuf>>,
}

impl ClientResponder {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots: Arc::new(roots),
        }
    }

    pub fn has_roots(&self) -> bool {
        !self.roots.is_empty()
    }

    /// Result payload or `(code, message)` for a JSON-RPC error reply.
    pub fn answer(&self, method: &str) -> Result<Value, (i64, String)> {
        match method {
            "ping" => Ok(json!({})),
            "roots/list" => {
                let roots: Vec<Value> = self
                    .roots
                    .iter()
                    .map(|root| {
                        let name = root
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| root.display().to_string());
                        json!({
                            "uri": format!("file://{}", root.display()),
                            "name": name,
                        })
                    })
                    .collect();
                Ok(json!({ "roots": roots }))
            }
            other => Err((
                -32601,
                format!("client does not implement method '{other}'"),
            )),
        }
    }
}

/// The slice of the tool host the conversation engine depends on.
#[async_trait]
pub trait ToolServerInterface: Send + Sync {
    async fn list_tools(&self, caller: &CallerContext) -> Vec<CapabilityDescriptor>;

    async fn invoke_tool(
        &self,
        name: &str,
        arguments: Value,
        caller: &CallerContext,
    ) -> Result<CallResult, HostError>;

    /// `(server, instructions)` for every server the caller can see.
    async fn server_instructions(&self, caller: &CallerContext) -> Vec<(String, String)>;
}
