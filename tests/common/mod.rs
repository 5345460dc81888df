// Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use orrery_core::model::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use orrery_core::{HostOptions, ServerConfig, ToolHost, TransportConfig};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

pub const FAKE_SERVER: &str = env!("CARGO_BIN_EXE_fake-tool-server");

/// Config for the fake server binary, launched as a local command.
pub fn fake_server(name: &str, args: &[&str]) -> ServerConfig {
    let mut argv = vec!["--name".to_string(), name.to_string()];
    argv.extend(args.iter().map(|arg| arg.to_string()));
    ServerConfig::new(name, TransportConfig::local(FAKE_SERVER, argv))
        .expect("fake server config")
        .with_timeout(Duration::from_secs(10))
        .with_registration_timeout(Duration::from_secs(10))
}

/// Same binary through the `stdio` transport kind.
pub fn fake_stdio_server(name: &str, args: &[&str]) -> ServerConfig {
    let mut argv = vec!["--name".to_string(), name.to_string()];
    argv.extend(args.iter().map(|arg| arg.to_string()));
    let transport = TransportConfig::Stdio {
        path: PathBuf::from(FAKE_SERVER),
        args: argv,
        env: Default::default(),
    };
    ServerConfig::new(name, transport).expect("fake server config")
}

pub fn host() -> ToolHost {
    ToolHost::new(HostOptions::default())
}

/// Replays queued responses and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ModelResponse>>,
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests.lock().expect("requests lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| ModelError::provider("scripted", "script exhausted"))
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check().await
}
