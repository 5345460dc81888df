use super::error::{HostError, ToolInvokeError};
use super::http::HttpStreamTransport;
use super::interface::{ClientResponder, Transport, TransportEvents};
use super::process::ProcessTransport;
use crate::config::{ServerConfig, TransportConfig};
use crate::constants::{CLIENT_NAME, PROTOCOL_VERSION};
use crate::domain::types::{CapabilityDescriptor, CapabilityKind};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A live, handshaken connection to one tool server.
pub struct ServerSession {
    config: ServerConfig,
    transport: Arc<dyn Transport>,
    instructions: Option<String>,
    server_info: Option<Value>,
    created_at: DateTime<Utc>,
}

struct Handshake {
    instructions: Option<String>,
    server_info: Option<Value>,
    descriptors: Vec<CapabilityDescriptor>,
}

impl ServerSession {
    /// Dial, handshake and discover within `registration_timeout`.
    ///
    /// On any failure the half-open transport is closed before returning.
    pub async fn connect(
        config: ServerConfig,
        responder: ClientResponder,
        events: TransportEvents,
    ) -> Result<(Self, Vec<CapabilityDescriptor>), HostError> {
        let name = config.name.clone();
        let (transport, listener): (Arc<dyn Transport>, Option<HttpStreamTransport>) =
            match &config.transport {
                TransportConfig::Stdio { .. } | TransportConfig::Local { .. } => {
                    let process = ProcessTransport::spawn(&config, responder.clone(), events)
                        .map_err(|err| HostError::connection(&name, err))?;
                    (Arc::new(process), None)
                }
                TransportConfig::HttpStream { .. } => {
                    let http = HttpStreamTransport::connect(&config, responder.clone(), events)
                        .map_err(|err| HostError::connection(&name, err))?;
                    (Arc::new(http.clone()), Some(http))
                }
            };

        let budget = config.registration_timeout;
        let outcome =
            tokio::time::timeout(budget, handshake(transport.as_ref(), &config, &responder)).await;
        let handshake = match outcome {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(err)) => {
                transport.close().await;
                return Err(HostError::connection(&name, err));
            }
            Err(_) => {
                warn!(server = %name, timeout = ?budget, "registration timed out");
                transport.close().await;
                return Err(HostError::RegistrationTimeout {
                    server: name,
                    timeout: budget,
                });
            }
        };

        if let Some(http) = listener {
            http.listen();
        }

        info!(
            server = %name,
            transport = config.kind().as_str(),
            capabilities = handshake.descriptors.len(),
            "tool server connected"
        );
        let session = Self {
            config,
            transport,
            instructions: handshake.instructions,
            server_info: handshake.server_info,
            created_at: Utc::now(),
        };
        Ok((session, handshake.descriptors))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn server_info(&self) -> Option<&Value> {
        self.server_info.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Request bounded by the server's per-request timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ToolInvokeError> {
        self.transport
            .request(method, params, self.config.timeout)
            .await
    }

    pub async fn ping(&self) -> Result<(), ToolInvokeError> {
        self.request("ping", json!({})).await.map(|_| ())
    }

    pub async fn discover(
        &self,
        kind: CapabilityKind,
    ) -> Result<Vec<CapabilityDescriptor>, ToolInvokeError> {
        discover(self.transport.as_ref(), &self.config, kind).await
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}

async fn handshake(
    transport: &dyn Transport,
    config: &ServerConfig,
    responder: &ClientResponder,
) -> Result<Handshake, ToolInvokeError> {
    let mut capabilities = json!({});
    if responder.has_roots() {
        capabilities["roots"] = json!({ "listChanged": false });
    }
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": capabilities
    });
    let init = transport
        .request("initialize", params, config.timeout)
        .await?;
    transport
        .notify("notifications/initialized", json!({}))
        .await?;

    let advertised = init.get("capabilities").cloned().unwrap_or_else(|| json!({}));
    let mut descriptors = Vec::new();
    for kind in CapabilityKind::ALL {
        if advertised.get(kind.collection()).is_none() {
            debug!(server = %config.name, kind = kind.as_str(), "capability not advertised");
            continue;
        }
        descriptors.extend(discover(transport, config, kind).await?);
    }

    Ok(Handshake {
        instructions: init
            .get("instructions")
            .and_then(Value::as_str)
            .map(str::to_string),
        server_info: init.get("serverInfo").cloned(),
        descriptors,
    })
}

/// List one capability kind, following `nextCursor` pages.
async fn discover(
    transport: &dyn Transport,
    config: &ServerConfig,
    kind: CapabilityKind,
) -> Result<Vec<CapabilityDescriptor>, ToolInvokeError> {
    let mut descriptors = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let params = match &cursor {
            Some(cursor) => json!({ "cursor": cursor }),
            None => json!({}),
        };
        let page = transport
            .request(kind.list_method(), params, config.timeout)
            .await?;
        for entry in page
            .get(kind.collection())
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            match CapabilityDescriptor::from_listing(kind, &config.name, entry) {
                Some(descriptor) => descriptors.push(descriptor),
                None => warn!(server = %config.name, kind = kind.as_str(), "skipping malformed listing entry"),
            }
        }
        match page.get("nextCursor").and_then(Value::as_str) {
            Some(next) if !next.is_empty() && cursor.as_deref() != Some(next) => {
                cursor = Some(next.to_string());
            }
            _ => break,
        }
    }
    Ok(descriptors)
}
