//! # Configuration
//!
//! Validated [`ServerConfig`] / [`AgentConfig`] values and a TOML loader.
//! Transport kinds are a tagged enum checked at construction, so nothing
//! downstream has to re-validate connection parameters.

mod agent;
mod error;
mod loader;
mod server;

pub use agent::{AgentConfig, LlmParams, RootScope, ServerScope};
pub use error::ConfigError;
pub use loader::{ensure_env_loaded, load_config};
pub use server::{ServerConfig, TransportConfig, TransportKind, interpreter_for};

use std::path::Path;

/// Everything a host process needs to start: roots, servers, agents.
#[derive(Debug, Clone, Default)]
pub struct OrreryConfig {
    /// Root URIs advertised to servers that ask for `roots/list`.
    pub roots: Vec<String>,
    pub servers: Vec<ServerConfig>,
    pub agents: Vec<AgentConfig>,
}

impl OrreryConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        loader::parse_config(content).map_err(|err| match err {
            loader::ParseFailure::Toml(source) => ConfigError::Parse {
                path: "<inline>".into(),
                source,
            },
            loader::ParseFailure::Config(err) => err,
        })
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|agent| agent.name == name)
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }
}
