use super::OrreryConfig;
use super::agent::{AgentConfig, RawAgent};
use super::error::ConfigError;
use super::server::{RawServer, ServerConfig};
use crate::constants::{CONFIG_PATH, ENV_PATH};
use dotenvy::from_filename;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Once;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub servers: Vec<RawServer>,
    #[serde(default)]
    pub agents: Vec<RawAgent>,
}

/// Ensures environment variables are loaded from config/.env
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration from a file path
pub fn load_config(path: Option<&Path>) -> Result<OrreryConfig, ConfigError> {
    ensure_env_loaded();
    let config_path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
    debug!(path = %config_path.display(), "Reading orrery configuration file");

    let content = fs::read_to_string(config_path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: config_path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            }
        }
    })?;

    parse_config(&content).map_err(|err| match err {
        ParseFailure::Toml(source) => ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        },
        ParseFailure::Config(err) => err,
    })
}

pub(super) enum ParseFailure {
    Toml(toml::de::Error),
    Config(ConfigError),
}

pub(super) fn parse_config(content: &str) -> Result<OrreryConfig, ParseFailure> {
    let parsed: RawConfig = toml::from_str(content).map_err(ParseFailure::Toml)?;
    validate_and_build(parsed).map_err(ParseFailure::Config)
}

fn validate_and_build(parsed: RawConfig) -> Result<OrreryConfig, ConfigError> {
    let mut seen = HashSet::new();
    let mut servers = Vec::with_capacity(parsed.servers.len());
    for raw in parsed.servers {
        let server = ServerConfig::try_from(raw)?;
        if !seen.insert(server.name.clone()) {
            return Err(ConfigError::DuplicateServer { name: server.name });
        }
        servers.push(server);
    }

    let mut seen = HashSet::new();
    let mut agents = Vec::with_capacity(parsed.agents.len());
    for raw in parsed.agents {
        let agent = AgentConfig::try_from(raw)?;
        if !seen.insert(agent.name.clone()) {
            return Err(ConfigError::DuplicateAgent { name: agent.name });
        }
        agents.push(agent);
    }

    Ok(OrreryConfig {
        roots: parsed.roots,
        servers,
        agents,
    })
}
