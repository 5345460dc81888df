use crate::config::{AgentConfig, RootScope, ServerScope};
use crate::domain::types::CapabilityDescriptor;
use std::collections::HashMap;

/// Who is asking: which servers, names and resource roots they may use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub servers: ServerScope,
    pub excluded_components: Vec<String>,
    pub roots: RootScope,
    /// Capability name -> server the caller explicitly routes it to.
    pub pinned: HashMap<String, String>,
}

impl CallerContext {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn from_agent(agent: &AgentConfig) -> Self {
        Self {
            servers: agent.servers.clone(),
            excluded_components: agent.excluded_components.clone(),
            roots: agent.resource_roots.clone(),
            pinned: HashMap::new(),
        }
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = ServerScope::Only(servers);
        self
    }

    pub fn with_excluded(mut self, names: Vec<String>) -> Self {
        self.excluded_components = names;
        self
    }

    pub fn with_roots(mut self, roots: Vec<String>) -> Self {
        self.roots = RootScope::Roots(roots);
        self
    }

    pub fn pin(mut self, capability: impl Into<String>, server: impl Into<String>) -> Self {
        self.pinned.insert(capability.into(), server.into());
        self
    }

    pub fn pinned_server(&self, capability: &str) -> Option<&str> {
        self.pinned.get(capability).map(String::as_str)
    }
}

/// Server-level exclusion followed by caller-level scoping.
pub struct FilterPolicy;

impl FilterPolicy {
    pub fn visible(
        descriptor: &CapabilityDescriptor,
        server_exclude: &[String],
        caller: &CallerContext,
    ) -> bool {
        let named = |list: &[String]| {
            list.iter().any(|excluded| {
                *excluded == descriptor.name || descriptor.uri.as_deref() == Some(excluded.as_str())
            })
        };
        !named(server_exclude)
            && caller.servers.allows(&descriptor.server)
            && !named(&caller.excluded_components)
    }
}
