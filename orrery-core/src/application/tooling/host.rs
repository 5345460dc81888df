use super::error::HostError;
use super::filter::{CallerContext, FilterPolicy};
use super::guard::AccessGuard;
use super::interface::{ClientResponder, ToolServerInterface, TransportEvent};
use super::registry::{CapabilityCounts, CapabilityRegistry};
use super::router::MessageRouter;
use super::session::ServerSession;
use crate::config::{OrreryConfig, ServerConfig, TransportKind};
use crate::domain::types::{CallResult, CapabilityDescriptor, CapabilityKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Host-wide settings shared by every session.
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Filesystem roots answered to servers asking `roots/list`.
    pub roots: Vec<PathBuf>,
}

impl HostOptions {
    pub fn from_config(config: &OrreryConfig) -> Self {
        Self {
            roots: config
                .roots
                .iter()
                .map(|root| PathBuf::from(root.strip_prefix("file://").unwrap_or(root)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub transport: TransportKind,
    pub alive: bool,
    pub capabilities: CapabilityCounts,
    pub connected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub servers: Vec<ServerStatus>,
    pub capability_count: usize,
}

/// Owns every server session and the registry built from them.
///
/// Cloning is cheap; all clones share the same sessions.
#[derive(Clone)]
pub struct ToolHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    registry: CapabilityRegistry,
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    connecting: Mutex<HashSet<String>>,
    responder: ClientResponder,
}

struct SessionEntry {
    session: ServerSession,
    monitor: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Descriptors pulled from the registry when the session died.
    withdrawn: std::sync::Mutex<Option<Arc<[CapabilityDescriptor]>>>,
}

impl SessionEntry {
    fn withdrawn(&self) -> Option<Arc<[CapabilityDescriptor]>> {
        self.withdrawn.lock().ok().and_then(|slot| slot.clone())
    }

    fn stop_monitor(&self) {
        if let Ok(mut slot) = self.monitor.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl ToolHost {
    pub fn new(options: HostOptions) -> Self {
        Self {
            inner: Arc::new(HostInner {
                registry: CapabilityRegistry::new(),
                sessions: RwLock::new(HashMap::new()),
                connecting: Mutex::new(HashSet::new()),
                responder: ClientResponder::new(options.roots),
            }),
        }
    }

    /// Connect a server and publish its capabilities.
    pub async fn register(&self, config: ServerConfig) -> Result<ServerStatus, HostError> {
        config.validate()?;
        let name = config.name.clone();
        {
            let mut connecting = self.inner.connecting.lock().await;
            if connecting.contains(&name) || self.inner.sessions.read().await.contains_key(&name) {
                return Err(HostError::AlreadyRegistered { name });
            }
            connecting.insert(name.clone());
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let outcome = ServerSession::connect(config, self.inner.responder.clone(), events).await;
        let (session, descriptors) = match outcome {
            Ok(connected) => connected,
            Err(err) => {
                self.inner.connecting.lock().await.remove(&name);
                warn!(server = %name, %err, "server registration failed");
                return Err(err);
            }
        };

        self.inner.registry.insert_server(&name, descriptors).await;
        let entry = Arc::new(SessionEntry {
            session,
            monitor: std::sync::Mutex::new(None),
            withdrawn: std::sync::Mutex::new(None),
        });
        self.inner
            .sessions
            .write()
            .await
            .insert(name.clone(), Arc::clone(&entry));
        self.inner.connecting.lock().await.remove(&name);

        let handle = tokio::spawn(monitor(
            Arc::downgrade(&self.inner),
            Arc::clone(&entry),
            receiver,
        ));
        if let Ok(mut slot) = entry.monitor.lock() {
            *slot = Some(handle);
        }

        Ok(self.inner.server_status(&entry).await)
    }

    /// Register every server of a loaded configuration, stopping at the first failure.
    pub async fn register_all(&self, config: &OrreryConfig) -> Result<Vec<ServerStatus>, HostError> {
        let mut statuses = Vec::with_capacity(config.servers.len());
        for server in &config.servers {
            statuses.push(self.register(server.clone()).await?);
        }
        Ok(statuses)
    }

    /// Drop a server's capabilities and close its transport.
    pub async fn unregister(&self, name: &str) -> Result<(), HostError> {
        let entry = self
            .inner
            .sessions
            .write()
            .await
            .remove(name)
            .ok_or_else(|| HostError::UnknownServer {
                name: name.to_string(),
            })?;
        let removed = self
            .inner
            .registry
            .remove_server(name)
            .await
            .map_or(0, |descriptors| descriptors.len());
        entry.stop_monitor();
        entry.session.close().await;
        info!(server = name, removed, "tool server unregistered");
        Ok(())
    }

    /// Capabilities visible to `caller`, optionally of one kind.
    pub async fn list(
        &self,
        kind: Option<CapabilityKind>,
        caller: &CallerContext,
    ) -> Vec<CapabilityDescriptor> {
        let excludes = self.inner.live_excludes().await;
        let mut listed = Vec::new();
        for (server, descriptors) in self.inner.registry.all().await {
            let Some(exclude) = excludes.get(&server) else {
                continue;
            };
            listed.extend(
                descriptors
                    .iter()
                    .filter(|descriptor| kind.is_none_or(|kind| descriptor.kind == kind))
                    .filter(|descriptor| FilterPolicy::visible(descriptor, exclude, caller))
                    .cloned(),
            );
        }
        listed
    }

    pub async fn describe(
        &self,
        kind: CapabilityKind,
        name: &str,
        caller: &CallerContext,
    ) -> Result<CapabilityDescriptor, HostError> {
        self.resolve(kind, name, caller).await
    }

    /// Route `(kind, name)` to exactly one visible descriptor.
    ///
    /// A name owned only by a dead session fails with
    /// [`HostError::Connection`] until that server is unregistered.
    pub async fn resolve(
        &self,
        kind: CapabilityKind,
        name: &str,
        caller: &CallerContext,
    ) -> Result<CapabilityDescriptor, HostError> {
        let excludes = self.inner.live_excludes().await;
        let candidates: Vec<CapabilityDescriptor> = self
            .inner
            .registry
            .lookup(kind, name)
            .await
            .into_iter()
            .filter(|descriptor| {
                excludes
                    .get(&descriptor.server)
                    .is_some_and(|exclude| FilterPolicy::visible(descriptor, exclude, caller))
            })
            .collect();
        if candidates.is_empty() {
            if let Some(server) = self.inner.closed_owner(kind, name, caller).await {
                return Err(HostError::Connection {
                    server,
                    message: "session is closed".to_string(),
                });
            }
        }
        MessageRouter::select(kind, name, candidates, caller)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        caller: &CallerContext,
    ) -> Result<CallResult, HostError> {
        let descriptor = self.resolve(CapabilityKind::Tool, name, caller).await?;
        debug!(server = %descriptor.server, tool = name, "routing tool call");
        self.execute(&descriptor.server, CapabilityKind::Tool, &descriptor.name, arguments)
            .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Value,
        caller: &CallerContext,
    ) -> Result<CallResult, HostError> {
        let descriptor = self.resolve(CapabilityKind::Prompt, name, caller).await?;
        self.execute(&descriptor.server, CapabilityKind::Prompt, &descriptor.name, arguments)
            .await
    }

    /// Read a resource by URI (or listed name), inside the caller's roots.
    pub async fn read_resource(
        &self,
        uri: &str,
        caller: &CallerContext,
    ) -> Result<CallResult, HostError> {
        if uri.contains("://") {
            AccessGuard::check_resource(uri, caller)?;
        }
        let descriptor = self.resolve(CapabilityKind::Resource, uri, caller).await?;
        let target = descriptor.uri.as_deref().unwrap_or(uri);
        AccessGuard::check_resource(target, caller)?;
        self.execute(&descriptor.server, CapabilityKind::Resource, target, Value::Null)
            .await
    }

    /// Call a named server directly, bypassing routing and filtering.
    pub async fn call_on(
        &self,
        server: &str,
        kind: CapabilityKind,
        name: &str,
        arguments: Value,
    ) -> Result<CallResult, HostError> {
        if !self.inner.sessions.read().await.contains_key(server) {
            return Err(HostError::UnknownServer {
                name: server.to_string(),
            });
        }
        self.execute(server, kind, name, arguments).await
    }

    pub async fn server_instructions(&self, server: &str) -> Option<String> {
        self.inner
            .sessions
            .read()
            .await
            .get(server)
            .and_then(|entry| entry.session.instructions().map(str::to_string))
    }

    pub async fn status(&self) -> HostStatus {
        let entries: Vec<Arc<SessionEntry>> =
            self.inner.sessions.read().await.values().cloned().collect();
        let mut servers = Vec::with_capacity(entries.len());
        for entry in &entries {
            servers.push(self.inner.server_status(entry).await);
        }
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        HostStatus {
            servers,
            capability_count: self.inner.registry.len().await,
        }
    }

    /// Close every session. The host stays usable for new registrations.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, Arc<SessionEntry>)> =
            self.inner.sessions.write().await.drain().collect();
        self.inner.registry.clear().await;
        let closing = entries.iter().map(|(_, entry)| {
            entry.stop_monitor();
            entry.session.close()
        });
        futures::future::join_all(closing).await;
        info!(servers = entries.len(), "tool host shut down");
    }

    async fn execute(
        &self,
        server: &str,
        kind: CapabilityKind,
        name: &str,
        arguments: Value,
    ) -> Result<CallResult, HostError> {
        let entry = self
            .inner
            .sessions
            .read()
            .await
            .get(server)
            .cloned()
            .ok_or_else(|| HostError::Connection {
                server: server.to_string(),
                message: "server is no longer registered".to_string(),
            })?;
        if !entry.session.is_alive() {
            return Err(HostError::Connection {
                server: server.to_string(),
                message: "session is closed".to_string(),
            });
        }

        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        let (method, params) = match kind {
            CapabilityKind::Tool => ("tools/call", json!({ "name": name, "arguments": arguments })),
            CapabilityKind::Prompt => ("prompts/get", json!({ "name": name, "arguments": arguments })),
            CapabilityKind::Resource => ("resources/read", json!({ "uri": name })),
        };
        let response = entry
            .session
            .request(method, params)
            .await
            .map_err(|err| HostError::from_invoke(kind, server, name, err))?;

        Ok(match kind {
            CapabilityKind::Tool => CallResult::from_tool_response(&response),
            CapabilityKind::Prompt => CallResult::from_prompt_response(&response),
            CapabilityKind::Resource => CallResult::from_resource_response(&response),
        })
    }
}

impl HostInner {
    /// Exclude lists of live sessions; dead ones contribute nothing.
    async fn live_excludes(&self) -> HashMap<String, Vec<String>> {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.session.is_alive())
            .map(|(name, entry)| (name.clone(), entry.session.config().exclude.clone()))
            .collect()
    }

    /// First dead session, by name, that still answers to `(kind, name)` for `caller`.
    async fn closed_owner(
        &self,
        kind: CapabilityKind,
        name: &str,
        caller: &CallerContext,
    ) -> Option<String> {
        let mut dead: Vec<Arc<SessionEntry>> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|entry| !entry.session.is_alive())
            .cloned()
            .collect();
        dead.sort_by(|a, b| a.session.name().cmp(b.session.name()));

        for entry in dead {
            let server = entry.session.name();
            let registered = self.registry.descriptors(server).await;
            let withdrawn = entry.withdrawn();
            let exclude = &entry.session.config().exclude;
            let owns = registered
                .iter()
                .chain(withdrawn.iter())
                .flat_map(|descriptors| descriptors.iter())
                .any(|descriptor| {
                    descriptor.answers_to(kind, name)
                        && FilterPolicy::visible(descriptor, exclude, caller)
                });
            if owns {
                return Some(server.to_string());
            }
        }
        None
    }

    async fn server_status(&self, entry: &SessionEntry) -> ServerStatus {
        let session = &entry.session;
        ServerStatus {
            name: session.name().to_string(),
            transport: session.config().kind(),
            alive: session.is_alive(),
            capabilities: self.registry.counts(session.name()).await,
            connected_at: session.created_at(),
            server_info: session.server_info().cloned(),
        }
    }

    fn is_current(sessions: &HashMap<String, Arc<SessionEntry>>, entry: &Arc<SessionEntry>) -> bool {
        sessions
            .get(entry.session.name())
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    async fn refresh(&self, entry: &Arc<SessionEntry>, kind: CapabilityKind) {
        let name = entry.session.name();
        match entry.session.discover(kind).await {
            Ok(fresh) => {
                if Self::is_current(&*self.sessions.read().await, entry) {
                    let count = fresh.len();
                    self.registry.replace_kind(name, kind, fresh).await;
                    info!(server = name, kind = kind.as_str(), count, "capability list refreshed");
                }
            }
            Err(err) => warn!(server = name, kind = kind.as_str(), %err, "failed to refresh capability list"),
        }
    }

    async fn forget(&self, entry: &Arc<SessionEntry>) {
        if Self::is_current(&*self.sessions.read().await, entry) {
            let withdrawn = self.registry.remove_server(entry.session.name()).await;
            let removed = withdrawn.as_ref().map_or(0, |descriptors| descriptors.len());
            if let Ok(mut slot) = entry.withdrawn.lock() {
                *slot = withdrawn;
            }
            warn!(server = entry.session.name(), removed, "session lost; capabilities withdrawn");
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Reacts to transport events and keeps the session alive with pings.
async fn monitor(
    host: Weak<HostInner>,
    entry: Arc<SessionEntry>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut keep_alive = entry.session.config().keep_alive.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tick(&mut keep_alive) => match entry.session.ping().await {
                Ok(()) => continue,
                Err(err) => {
                    warn!(server = entry.session.name(), %err, "keep-alive ping failed; closing session");
                    entry.session.close().await;
                    Some(TransportEvent::Closed)
                }
            },
        };
        let Some(host) = host.upgrade() else {
            break;
        };
        match event {
            Some(TransportEvent::ListChanged(kind)) => host.refresh(&entry, kind).await,
            Some(TransportEvent::Closed) | None => {
                host.forget(&entry).await;
                break;
            }
        }
    }
}

#[async_trait]
impl ToolServerInterface for ToolHost {
    async fn list_tools(&self, caller: &CallerContext) -> Vec<CapabilityDescriptor> {
        self.list(Some(CapabilityKind::Tool), caller).await
    }

    async fn invoke_tool(
        &self,
        name: &str,
        arguments: Value,
        caller: &CallerContext,
    ) -> Result<CallResult, HostError> {
        self.call_tool(name, arguments, caller).await
    }

    async fn server_instructions(&self, caller: &CallerContext) -> Vec<(String, String)> {
        let sessions = self.inner.sessions.read().await;
        let mut instructions: Vec<(String, String)> = sessions
            .values()
            .filter(|entry| entry.session.is_alive() && caller.servers.allows(entry.session.name()))
            .filter_map(|entry| {
                entry
                    .session
                    .instructions()
                    .map(|text| (entry.session.name().to_string(), text.to_string()))
            })
            .collect();
        instructions.sort();
        instructions
    }
}
