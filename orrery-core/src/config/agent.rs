use super::error::ConfigError;
use crate::constants::DEFAULT_MAX_ITERATIONS;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Which servers a caller may see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerScope {
    #[default]
    All,
    Only(Vec<String>),
}

impl ServerScope {
    pub fn allows(&self, server: &str) -> bool {
        match self {
            ServerScope::All => true,
            ServerScope::Only(servers) => servers.iter().any(|name| name == server),
        }
    }
}

/// Resource URIs a caller may read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RootScope {
    #[default]
    Unrestricted,
    Roots(Vec<String>),
}

/// Provider-agnostic generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default, flatten)]
    pub extra: JsonMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    pub servers: ServerScope,
    pub excluded_components: Vec<String>,
    pub system_prompt: String,
    pub llm_params: LlmParams,
    /// Bound on model/tool round trips in one run, not on messages.
    pub max_iterations: usize,
    pub include_history: bool,
    pub resource_roots: RootScope,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            servers: ServerScope::All,
            excluded_components: Vec::new(),
            system_prompt: String::new(),
            llm_params: LlmParams::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            include_history: true,
            resource_roots: RootScope::Unrestricted,
        }
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = ServerScope::Only(servers);
        self
    }

    pub fn with_excluded_components(mut self, names: Vec<String>) -> Self {
        self.excluded_components = names;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_llm_params(mut self, params: LlmParams) -> Self {
        self.llm_params = params;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_history(mut self, include_history: bool) -> Self {
        self.include_history = include_history;
        self
    }

    pub fn with_resource_roots(mut self, roots: Vec<String>) -> Self {
        self.resource_roots = RootScope::Roots(roots);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("<unnamed>", "agent name is empty"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid(
                &self.name,
                "max_iterations must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAgent {
    name: String,
    /// Absent means every registered server.
    servers: Option<Vec<String>>,
    #[serde(default)]
    excluded_components: Vec<String>,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    llm: LlmParams,
    max_iterations: Option<usize>,
    #[serde(default = "default_include_history")]
    include_history: bool,
    resource_roots: Option<Vec<String>>,
}

fn default_include_history() -> bool {
    true
}

impl TryFrom<RawAgent> for AgentConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAgent) -> Result<Self, Self::Error> {
        let config = AgentConfig {
            name: raw.name,
            servers: raw.servers.map(ServerScope::Only).unwrap_or_default(),
            excluded_components: raw.excluded_components,
            system_prompt: raw.system_prompt,
            llm_params: raw.llm,
            max_iterations: raw.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            include_history: raw.include_history,
            resource_roots: raw
                .resource_roots
                .map(RootScope::Roots)
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}
