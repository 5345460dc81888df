use super::error::ConfigError;
use crate::constants::{DEFAULT_REGISTRATION_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Local,
    HttpStream,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Local => "local",
            TransportKind::HttpStream => "http_stream",
        }
    }
}

/// How to reach a tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// A server script or executable spawned with piped stdio.
    Stdio {
        path: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// An arbitrary local command (e.g. a package runner) spawned with piped stdio.
    Local {
        command: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        workdir: Option<PathBuf>,
    },
    /// JSON-RPC over HTTP POST with optional event-stream replies.
    HttpStream {
        endpoint: String,
        headers: HashMap<String, String>,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Stdio { .. } => TransportKind::Stdio,
            TransportConfig::Local { .. } => TransportKind::Local,
            TransportConfig::HttpStream { .. } => TransportKind::HttpStream,
        }
    }

    pub fn stdio(path: impl Into<PathBuf>) -> Self {
        Self::Stdio {
            path: path.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn local(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self::Local {
            command: command.into(),
            args,
            env: HashMap::new(),
            workdir: None,
        }
    }

    pub fn http_stream(endpoint: impl Into<String>) -> Self {
        Self::HttpStream {
            endpoint: endpoint.into(),
            headers: HashMap::new(),
        }
    }
}

/// Validated connection settings for one tool server.
///
/// Immutable once registered; changing it means unregister + register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportConfig,
    /// Capability names never surfaced to any caller.
    pub exclude: Vec<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Budget for dial, handshake and discovery together.
    pub registration_timeout: Duration,
    pub keep_alive: Option<Duration>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, transport: TransportConfig) -> Result<Self, ConfigError> {
        let config = Self {
            name: name.into(),
            transport,
            exclude: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            keep_alive: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_exclude(mut self, names: Vec<String>) -> Self {
        self.exclude = names;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("<unnamed>", "server name is empty"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid(&self.name, "timeout must be non-zero"));
        }
        if self.registration_timeout.is_zero() {
            return Err(ConfigError::invalid(
                &self.name,
                "registration_timeout must be non-zero",
            ));
        }
        if matches!(self.keep_alive, Some(interval) if interval.is_zero()) {
            return Err(ConfigError::invalid(&self.name, "keep_alive must be non-zero"));
        }
        match &self.transport {
            TransportConfig::Stdio { path, .. } if path.as_os_str().is_empty() => Err(
                ConfigError::invalid(&self.name, "stdio transport requires a path"),
            ),
            TransportConfig::Local { command, .. } if command.as_os_str().is_empty() => Err(
                ConfigError::invalid(&self.name, "local transport requires a command"),
            ),
            TransportConfig::HttpStream { endpoint, .. } => {
                let url = reqwest::Url::parse(endpoint).map_err(|err| {
                    ConfigError::invalid(&self.name, format!("invalid endpoint: {err}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::invalid(
                        &self.name,
                        "http_stream endpoint must use http or https",
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Interpreter used to launch a stdio server script, if any.
pub fn interpreter_for(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("py") => Some("python3"),
        Some("js" | "mjs" | "cjs") => Some("node"),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    name: String,
    transport: TransportKind,
    path: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    workdir: Option<String>,
    endpoint: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    exclude: Vec<String>,
    /// Seconds.
    timeout: Option<u64>,
    /// Seconds.
    registration_timeout: Option<u64>,
    /// Seconds.
    keep_alive: Option<u64>,
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl TryFrom<RawServer> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServer) -> Result<Self, Self::Error> {
        let env: HashMap<String, String> = raw
            .env
            .into_iter()
            .map(|(key, value)| (key, expand(&value)))
            .collect();
        let args: Vec<String> = raw.args.iter().map(|arg| expand(arg)).collect();

        let transport = match raw.transport {
            TransportKind::Stdio => {
                let path = raw.path.ok_or_else(|| {
                    ConfigError::invalid(&raw.name, "stdio transport requires 'path'")
                })?;
                TransportConfig::Stdio {
                    path: PathBuf::from(expand(&path)),
                    args,
                    env,
                }
            }
            TransportKind::Local => {
                let command = raw.command.ok_or_else(|| {
                    ConfigError::invalid(&raw.name, "local transport requires 'command'")
                })?;
                TransportConfig::Local {
                    command: PathBuf::from(expand(&command)),
                    args,
                    env,
                    workdir: raw.workdir.map(|dir| PathBuf::from(expand(&dir))),
                }
            }
            TransportKind::HttpStream => {
                let endpoint = raw.endpoint.ok_or_else(|| {
                    ConfigError::invalid(&raw.name, "http_stream transport requires 'endpoint'")
                })?;
                TransportConfig::HttpStream {
                    endpoint: expand(&endpoint),
                    headers: raw
                        .headers
                        .into_iter()
                        .map(|(key, value)| (key, expand(&value)))
                        .collect(),
                }
            }
        };

        let mut config = ServerConfig::new(raw.name, transport)?.with_exclude(raw.exclude);
        if let Some(secs) = raw.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = raw.registration_timeout {
            config = config.with_registration_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = raw.keep_alive {
            config = config.with_keep_alive(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }
}
