use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::types::CapabilityKind;

/// Failure of a single JSON-RPC exchange with one server.
#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("failed to spawn server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("server '{server}' request '{method}' timed out after {timeout:?}")]
    Timeout {
        server: String,
        method: String,
        timeout: Duration,
    },
    #[error("server '{server}' HTTP request failed: {source}")]
    Http {
        server: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server '{server}' terminated unexpectedly")]
    Terminated { server: String },
    #[error("server '{server}' request cancelled")]
    Cancelled { server: String },
}

impl ToolInvokeError {
    pub(crate) fn transport(server: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            server: server.to_string(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the tool host to its callers.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("connection to server '{server}' failed: {message}")]
    Connection { server: String, message: String },
    #[error("server '{server}' did not finish registering within {timeout:?}")]
    RegistrationTimeout { server: String, timeout: Duration },
    #[error("{kind} '{name}' not found")]
    NotFound { kind: CapabilityKind, name: String },
    #[error("{kind} '{name}' is provided by several servers: {}", servers.join(", "))]
    Ambiguous {
        kind: CapabilityKind,
        name: String,
        servers: Vec<String>,
    },
    #[error("{kind} '{name}' on server '{server}' failed with code {code}: {message}")]
    ToolExecution {
        kind: CapabilityKind,
        server: String,
        name: String,
        code: i64,
        message: String,
    },
    #[error("{kind} '{name}' on server '{server}' timed out after {timeout:?}")]
    Timeout {
        kind: CapabilityKind,
        server: String,
        name: String,
        timeout: Duration,
    },
    #[error("access denied: {reason}")]
    SecurityViolation { reason: String },
    #[error("server '{name}' is already registered")]
    AlreadyRegistered { name: String },
    #[error("server '{name}' is not registered")]
    UnknownServer { name: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HostError {
    /// Map a transport failure that happened while serving `name` on `server`.
    pub(crate) fn from_invoke(
        kind: CapabilityKind,
        server: &str,
        name: &str,
        err: ToolInvokeError,
    ) -> Self {
        match err {
            ToolInvokeError::Rpc { code, message, .. } => HostError::ToolExecution {
                kind,
                server: server.to_string(),
                name: name.to_string(),
                code,
                message,
            },
            ToolInvokeError::Timeout { timeout, .. } => HostError::Timeout {
                kind,
                server: server.to_string(),
                name: name.to_string(),
                timeout,
            },
            other => HostError::Connection {
                server: server.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn connection(server: &str, err: ToolInvokeError) -> Self {
        HostError::Connection {
            server: server.to_string(),
            message: err.to_string(),
        }
    }

    /// Short message suitable for feeding back to a model.
    pub fn user_message(&self) -> String {
        match self {
            HostError::NotFound { kind, name } => format!("{kind} '{name}' is not available"),
            HostError::Ambiguous {
                kind,
                name,
                servers,
            } => format!(
                "{kind} '{name}' exists on several servers ({}); specify one",
                servers.join(", ")
            ),
            HostError::ToolExecution { message, .. } => message.clone(),
            HostError::Timeout { name, timeout, .. } => {
                format!("'{name}' did not respond within {}s", timeout.as_secs())
            }
            HostError::SecurityViolation { reason } => format!("access denied: {reason}"),
            other => other.to_string(),
        }
    }
}
