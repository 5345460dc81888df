use crate::application::tooling::{CallerContext, ToolServerInterface};
use crate::config::AgentConfig;
use crate::infrastructure::model::ToolSpec;
use std::collections::HashSet;

/// Agent prompt followed by each visible server's handshake instructions.
pub(crate) async fn compose_system_prompt(
    host: &dyn ToolServerInterface,
    agent: &AgentConfig,
    caller: &CallerContext,
) -> String {
    let mut sections = Vec::new();
    let base = agent.system_prompt.trim();
    if !base.is_empty() {
        sections.push(base.to_string());
    }
    for (server, instructions) in host.server_instructions(caller).await {
        let instructions = instructions.trim();
        if !instructions.is_empty() {
            sections.push(format!("Instructions from server '{server}':\n{instructions}"));
        }
    }
    sections.join("\n\n")
}

/// Tools the model may call this turn, one spec per name.
pub(crate) async fn tool_specs(
    host: &dyn ToolServerInterface,
    caller: &CallerContext,
) -> Vec<ToolSpec> {
    let mut seen = HashSet::new();
    host.list_tools(caller)
        .await
        .iter()
        .filter(|descriptor| seen.insert(descriptor.name.clone()))
        .map(ToolSpec::from)
        .collect()
}
