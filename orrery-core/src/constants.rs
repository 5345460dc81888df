//! Application constants
//!
//! Single source of truth for paths, protocol values and default budgets.

use std::time::Duration;

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/orrery.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

/// Tool-server protocol revision sent during the handshake
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Client name advertised to tool servers
pub const CLIENT_NAME: &str = "orrery";

/// Per-request timeout when a server config does not set one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Budget for dial + handshake + discovery when a server config does not set one
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on LLM/tool round trips per run
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Header carrying the server-assigned session on HTTP-stream transports
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Capacity of the streaming event channel between engine and consumer
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
