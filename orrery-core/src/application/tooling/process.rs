use super::error::ToolInvokeError;
use super::interface::{ClientResponder, Transport, TransportEvent, TransportEvents};
use crate::config::{ServerConfig, TransportConfig, interpreter_for};
use crate::domain::types::CapabilityKind;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

type Responder = oneshot::Sender<Result<Value, ToolInvokeError>>;

/// Line-delimited JSON-RPC over the stdio pipes of a spawned child.
#[derive(Clone)]
pub struct ProcessTransport {
    inner: Arc<ProcessInner>,
}

struct ProcessInner {
    server: String,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, Responder>>,
    id_counter: AtomicU64,
    alive: AtomicBool,
    responder: ClientResponder,
    events: TransportEvents,
}

impl ProcessTransport {
    /// Spawn the server described by `config` and start its reader task.
    pub fn spawn(
        config: &ServerConfig,
        responder: ClientResponder,
        events: TransportEvents,
    ) -> Result<Self, ToolInvokeError> {
        let mut command = build_command(config)?;
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ToolInvokeError::Spawn {
            server: config.name.clone(),
            source,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolInvokeError::transport(&config.name, "failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolInvokeError::transport(&config.name, "failed to capture server stdout"))?;

        debug!(server = %config.name, pid = ?child.id(), "spawned tool server");

        let inner = Arc::new(ProcessInner {
            server: config.name.clone(),
            child: AsyncMutex::new(Some(child)),
            writer: AsyncMutex::new(Some(BufWriter::new(stdin))),
            pending: AsyncMutex::new(HashMap::new()),
            id_counter: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            responder,
            events,
        });

        let reader = Arc::clone(&inner);
        tokio::spawn(async move {
            reader.reader_loop(stdout).await;
        });

        Ok(Self { inner })
    }
}

fn build_command(config: &ServerConfig) -> Result<Command, ToolInvokeError> {
    match &config.transport {
        TransportConfig::Stdio { path, args, env } => {
            let mut command = match interpreter_for(path) {
                Some(interpreter) => {
                    let mut command = Command::new(interpreter);
                    command.arg(path);
                    command
                }
                None => Command::new(path),
            };
            command.args(args).envs(env);
            Ok(command)
        }
        TransportConfig::Local {
            command: program,
            args,
            env,
            workdir,
        } => {
            let mut command = Command::new(program);
            command.args(args).envs(env);
            if let Some(dir) = workdir {
                command.current_dir(dir);
            }
            Ok(command)
        }
        TransportConfig::HttpStream { .. } => Err(ToolInvokeError::transport(
            &config.name,
            "http_stream servers cannot be spawned as processes",
        )),
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError> {
        self.inner.send_request(method, params, timeout).await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        self.inner
            .write_message(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params
            }))
            .await
    }

    fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.inner.shutdown(false).await;
    }
}

impl ProcessInner {
    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(raw)) = lines.next_line().await {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('\u{1b}') {
                debug!(
                    server = %self.server,
                    line = trimmed,
                    "skipping ANSI log line from tool server"
                );
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => {
                    if let Err(err) = self.process_inbound_message(value).await {
                        warn!(server = %self.server, %err, "failed to process message from tool server");
                    }
                }
                Err(source) => {
                    warn!(
                        server = %self.server,
                        line = trimmed,
                        %source,
                        "received invalid JSON from tool server"
                    );
                }
            }
        }

        self.shutdown(true).await;
    }

    async fn process_inbound_message(&self, value: Value) -> Result<(), ToolInvokeError> {
        let method = value.get("method").and_then(Value::as_str);
        match (value.get("id").cloned(), method) {
            (Some(id), Some(method)) => self.handle_server_request(id, method).await,
            (Some(id), None) => {
                self.handle_response(id, value).await;
                Ok(())
            }
            (None, Some(method)) => {
                self.handle_notification(method);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    async fn handle_response(&self, id: Value, value: Value) {
        let Some(key) = response_key(&id) else {
            return;
        };
        let responder = self.pending.lock().await.remove(&key);
        let Some(sender) = responder else {
            debug!(server = %self.server, response_id = key, "received response for unknown request");
            return;
        };
        let _ = sender.send(decode_response(&self.server, value));
    }

    async fn handle_server_request(&self, id: Value, method: &str) -> Result<(), ToolInvokeError> {
        let reply = match self.responder.answer(method) {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => {
                warn!(server = %self.server, method, "server sent unsupported request");
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": code, "message": message }
                })
            }
        };
        self.write_message(&reply).await
    }

    fn handle_notification(&self, method: &str) {
        debug!(server = %self.server, method, "received notification from server");
        if let Some(kind) = CapabilityKind::from_list_changed(method) {
            let _ = self.events.send(TransportEvent::ListChanged(kind));
        }
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ToolInvokeError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(ToolInvokeError::Terminated {
                server: self.server.clone(),
            });
        }
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        if let Err(err) = self.write_message(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ToolInvokeError::Cancelled {
                server: self.server.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ToolInvokeError::Timeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn write_message(&self, message: &Value) -> Result<(), ToolInvokeError> {
        let mut encoded =
            serde_json::to_string(message).map_err(|source| ToolInvokeError::InvalidJson {
                server: self.server.clone(),
                source,
            })?;
        encoded.push('\n');

        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(ToolInvokeError::Terminated {
                server: self.server.clone(),
            });
        };
        let io_error = |source: std::io::Error| ToolInvokeError::transport(&self.server, source.to_string());
        stream.write_all(encoded.as_bytes()).await.map_err(io_error)?;
        stream.flush().await.map_err(io_error)?;
        Ok(())
    }

    /// Tear the child down; `from_reader` reports the death to the host.
    async fn shutdown(&self, from_reader: bool) {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(err) = child.kill().await {
                debug!(server = %self.server, %err, "failed to kill tool server (may have already exited)");
            }
            let _ = child.wait().await;
        }

        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(ToolInvokeError::Terminated {
                server: self.server.clone(),
            }));
        }
        drop(pending);

        if was_alive && from_reader {
            warn!(server = %self.server, "tool server exited");
            let _ = self.events.send(TransportEvent::Closed);
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }
}

pub(crate) fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

/// Turn a JSON-RPC response envelope into its result or an `Rpc` error.
pub(crate) fn decode_response(server: &str, value: Value) -> Result<Value, ToolInvokeError> {
    match value.get("error") {
        Some(error) => Err(ToolInvokeError::Rpc {
            server: server.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
        None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
    }
}
