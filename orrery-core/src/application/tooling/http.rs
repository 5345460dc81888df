use super::error::ToolInvokeError;
use super::interface::{ClientResponder, Transport, TransportEvent, TransportEvents};
use super::process::{decode_response, response_key};
use crate::config::{ServerConfig, TransportConfig};
use crate::constants::SESSION_HEADER;
use crate::domain::types::CapabilityKind;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use reqwest_eventsource::{Event, EventSource};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const ACCEPT_BOTH: &str = "application/json, text/event-stream";
const DELETE_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON-RPC over HTTP POST; replies arrive as plain JSON or as an event stream.
#[derive(Clone)]
pub struct HttpStreamTransport {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    server: String,
    endpoint: String,
    client: Client,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    id_counter: AtomicU64,
    alive: AtomicBool,
    closed: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
    responder: ClientResponder,
    events: TransportEvents,
}

impl HttpStreamTransport {
    pub fn connect(
        config: &ServerConfig,
        responder: ClientResponder,
        events: TransportEvents,
    ) -> Result<Self, ToolInvokeError> {
        let TransportConfig::HttpStream { endpoint, headers } = &config.transport else {
            return Err(ToolInvokeError::transport(
                &config.name,
                "server is not configured for http_stream",
            ));
        };

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
                ToolInvokeError::transport(&config.name, format!("invalid header '{key}': {err}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|err| {
                ToolInvokeError::transport(&config.name, format!("invalid value for header '{key}': {err}"))
            })?;
            header_map.insert(name, value);
        }

        let client = Client::builder()
            .build()
            .map_err(|source| ToolInvokeError::Http {
                server: config.name.clone(),
                source,
            })?;
        let (closed, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(HttpInner {
                server: config.name.clone(),
                endpoint: endpoint.clone(),
                client,
                headers: header_map,
                session_id: Mutex::new(None),
                id_counter: AtomicU64::new(1),
                alive: AtomicBool::new(true),
                closed,
                listener: Mutex::new(None),
                responder,
                events,
            }),
        })
    }

    /// Open the server-initiated event stream, once the handshake has
    /// assigned a session.
    pub fn listen(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.listen_loop().await });
        if let Ok(mut slot) = self.inner.listener.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }
}

#[async_trait]
impl Transport for HttpStreamTransport {
    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError> {
        if !self.is_alive() {
            return Err(self.inner.terminated());
        }
        let id = format!("req-{}", self.inner.id_counter.fetch_add(1, Ordering::SeqCst));
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let mut closed = self.inner.closed.subscribe();
        tokio::select! {
            outcome = tokio::time::timeout(timeout, self.inner.exchange(&id, &payload)) => {
                outcome.unwrap_or_else(|_| Err(ToolInvokeError::Timeout {
                    server: self.inner.server.clone(),
                    method: method.to_string(),
                    timeout,
                }))
            }
            _ = async { let _ = closed.wait_for(|closed| *closed).await; } => {
                Err(self.inner.terminated())
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        let response = self.inner.post(&payload).await?;
        if !response.status().is_success() {
            return Err(self.inner.status_error(response).await);
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.closed.send_replace(true);
        if let Ok(mut slot) = self.inner.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }

        let Some(session) = self.inner.session_id() else {
            return;
        };
        let outcome = self
            .inner
            .with_headers(self.inner.client.delete(&self.inner.endpoint))
            .header(SESSION_HEADER, session)
            .timeout(DELETE_TIMEOUT)
            .send()
            .await;
        if let Err(err) = outcome {
            debug!(server = %self.inner.server, %err, "session delete failed");
        }
    }
}

impl HttpInner {
    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|guard| guard.clone())
    }

    fn terminated(&self) -> ToolInvokeError {
        ToolInvokeError::Terminated {
            server: self.server.clone(),
        }
    }

    fn with_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.headers(self.headers.clone());
        match self.session_id() {
            Some(session) => builder.header(SESSION_HEADER, session),
            None => builder,
        }
    }

    async fn post(&self, payload: &Value) -> Result<Response, ToolInvokeError> {
        let outcome = self
            .with_headers(self.client.post(&self.endpoint))
            .header(ACCEPT, ACCEPT_BOTH)
            .json(payload)
            .send()
            .await;
        match outcome {
            Ok(response) => {
                if let Some(session) = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|value| value.to_str().ok())
                {
                    if let Ok(mut slot) = self.session_id.lock() {
                        *slot = Some(session.to_string());
                    }
                }
                Ok(response)
            }
            Err(source) => {
                if source.is_connect() {
                    self.mark_dead();
                }
                Err(ToolInvokeError::Http {
                    server: self.server.clone(),
                    source,
                })
            }
        }
    }

    async fn exchange(&self, id: &str, payload: &Value) -> Result<Value, ToolInvokeError> {
        let response = self.post(payload).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND && self.session_id().is_some() {
            warn!(server = %self.server, "server no longer recognises the session");
            self.mark_dead();
            return Err(self.terminated());
        }
        if !status.is_success() {
            return Err(self.status_error(response).await);
        }

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        if is_stream {
            return self.read_event_stream(id, response).await;
        }

        let body = response.bytes().await.map_err(|source| ToolInvokeError::Http {
            server: self.server.clone(),
            source,
        })?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|source| ToolInvokeError::InvalidJson {
                server: self.server.clone(),
                source,
            })?;
        decode_response(&self.server, value)
    }

    /// Scan `data:` frames until the reply for `id` shows up, handling any
    /// server messages sent ahead of it.
    async fn read_event_stream(
        &self,
        id: &str,
        response: Response,
    ) -> Result<Value, ToolInvokeError> {
        let mut byte_stream = response.bytes_stream();
        let mut frames = EventFrames::default();

        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|source| ToolInvokeError::Http {
                server: self.server.clone(),
                source,
            })?;

            for frame in frames.push(&bytes) {
                let value: Value = match serde_json::from_str(&frame) {
                    Ok(value) => value,
                    Err(source) => {
                        warn!(server = %self.server, %source, "skipping malformed event frame");
                        continue;
                    }
                };
                let is_reply = value.get("method").is_none()
                    && value.get("id").and_then(response_key).as_deref() == Some(id);
                if is_reply {
                    return decode_response(&self.server, value);
                }
                self.handle_inbound(value).await;
            }
        }

        Err(ToolInvokeError::transport(
            &self.server,
            "event stream ended before the response arrived",
        ))
    }

    async fn handle_inbound(&self, value: Value) {
        let Some(method) = value.get("method").and_then(Value::as_str) else {
            return;
        };
        match value.get("id") {
            Some(id) => {
                let reply = match self.responder.answer(method) {
                    Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                    Err((code, message)) => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": code, "message": message }
                    }),
                };
                if let Err(err) = self.post(&reply).await {
                    warn!(server = %self.server, method, %err, "failed to answer server request");
                }
            }
            None => {
                debug!(server = %self.server, method, "received notification from server");
                if let Some(kind) = CapabilityKind::from_list_changed(method) {
                    let _ = self.events.send(TransportEvent::ListChanged(kind));
                }
            }
        }
    }

    async fn listen_loop(self: Arc<Self>) {
        let builder = self.with_headers(self.client.get(&self.endpoint));
        let mut source = match EventSource::new(builder) {
            Ok(source) => source,
            Err(err) => {
                debug!(server = %self.server, %err, "cannot open server event stream");
                return;
            }
        };
        let mut closed = self.closed.subscribe();

        loop {
            tokio::select! {
                _ = async { let _ = closed.wait_for(|closed| *closed).await; } => break,
                next = source.next() => match next {
                    Some(Ok(Event::Open)) => {
                        debug!(server = %self.server, "server event stream opened");
                    }
                    Some(Ok(Event::Message(message))) => {
                        match serde_json::from_str::<Value>(&message.data) {
                            Ok(value) => self.handle_inbound(value).await,
                            Err(source) => {
                                warn!(server = %self.server, %source, "skipping malformed server event");
                            }
                        }
                    }
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => break,
                    Some(Err(err)) => {
                        debug!(server = %self.server, %err, "server event stream unavailable");
                        break;
                    }
                },
            }
        }
        source.close();
    }

    async fn status_error(&self, response: Response) -> ToolInvokeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        ToolInvokeError::transport(&self.server, format!("HTTP {status}: {snippet}"))
    }

    fn mark_dead(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.closed.send_replace(true);
            let _ = self.events.send(TransportEvent::Closed);
        }
    }
}

/// Splits an event-stream body into the joined `data:` payload of each frame.
///
/// Bytes are held until a full line arrives so a character split across
/// network chunks is decoded whole.
#[derive(Debug, Default)]
struct EventFrames {
    pending: Vec<u8>,
    data: String,
}

impl EventFrames {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(line_end) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);
            let line = line.trim_end_matches('\r');

            if let Some(rest) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(rest.trim_start());
            } else if line.is_empty() && !self.data.is_empty() {
                frames.push(std::mem::take(&mut self.data));
            }
        }
        frames
    }
}
