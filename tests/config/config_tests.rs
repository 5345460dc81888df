// Config tests - loading from disk, env expansion and wiring into a host.

#[path = "../common/mod.rs"]
mod common;

use common::FAKE_SERVER;
use orrery_core::{
    CallerContext, ConfigError, HostOptions, OrreryConfig, ServerScope, ToolHost, TransportConfig,
};
use serde_json::json;
use serial_test::serial;
use std::env;
use std::fs;

#[test]
#[serial]
fn env_vars_expand_in_server_fields() {
    unsafe {
        env::set_var("ORRERY_IT_BIN", "/opt/orrery/bin");
        env::set_var("ORRERY_IT_TOKEN", "t0ken");
    }
    let doc = r#"
[[servers]]
name = "local"
transport = "local"
command = "${ORRERY_IT_BIN}/server"
args = ["--token", "$ORRERY_IT_TOKEN"]

[[servers]]
name = "remote"
transport = "http_stream"
endpoint = "http://localhost:9000/mcp"
headers = { Authorization = "Bearer ${ORRERY_IT_TOKEN}" }
"#;
    let config = OrreryConfig::from_toml(doc).expect("parse");

    match &config.server("local").expect("local").transport {
        TransportConfig::Local { command, args, .. } => {
            assert_eq!(command.to_string_lossy(), "/opt/orrery/bin/server");
            assert_eq!(args, &vec!["--token".to_string(), "t0ken".to_string()]);
        }
        other => panic!("unexpected transport {other:?}"),
    }
    match &config.server("remote").expect("remote").transport {
        TransportConfig::HttpStream { headers, .. } => {
            assert_eq!(headers["Authorization"], "Bearer t0ken");
        }
        other => panic!("unexpected transport {other:?}"),
    }

    unsafe {
        env::remove_var("ORRERY_IT_BIN");
        env::remove_var("ORRERY_IT_TOKEN");
    }
}

#[test]
#[serial]
fn invalid_entries_are_rejected_at_load() {
    let missing_command = r#"
[[servers]]
name = "broken"
transport = "local"
"#;
    assert!(matches!(
        OrreryConfig::from_toml(missing_command),
        Err(ConfigError::Invalid { .. })
    ));

    let bad_endpoint = r#"
[[servers]]
name = "remote"
transport = "http_stream"
endpoint = "ftp://example.com"
"#;
    assert!(matches!(
        OrreryConfig::from_toml(bad_endpoint),
        Err(ConfigError::Invalid { .. })
    ));

    let zero_iterations = r#"
[[agents]]
name = "looper"
max_iterations = 0
"#;
    assert!(matches!(
        OrreryConfig::from_toml(zero_iterations),
        Err(ConfigError::Invalid { .. })
    ));

    let duplicate_agents = r#"
[[agents]]
name = "twin"

[[agents]]
name = "twin"
"#;
    assert!(matches!(
        OrreryConfig::from_toml(duplicate_agents),
        Err(ConfigError::DuplicateAgent { .. })
    ));
}

#[test]
#[serial]
fn agent_without_server_list_sees_everything() {
    let config = OrreryConfig::from_toml(
        r#"
[[agents]]
name = "generalist"
"#,
    )
    .expect("parse");
    let agent = config.agent("generalist").expect("agent");
    assert_eq!(agent.servers, ServerScope::All);
    assert!(agent.include_history);
    assert!(agent.max_iterations > 0);
}

#[tokio::test]
#[serial]
async fn loaded_config_registers_every_server() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("orrery.toml");
    let doc = format!(
        r#"
roots = ["file://{root}"]

[[servers]]
name = "weather"
transport = "local"
command = "{bin}"
args = ["--name", "weather", "--tools", "get_weather"]
timeout = 10
registration_timeout = 10

[[servers]]
name = "notes"
transport = "stdio"
path = "{bin}"
args = ["--name", "notes", "--tools", "add_note"]

[[agents]]
name = "assistant"
servers = ["weather"]
"#,
        root = dir.path().display(),
        bin = FAKE_SERVER,
    );
    fs::write(&path, doc).expect("write config");

    let config = OrreryConfig::load(Some(&path)).expect("load");
    let host = ToolHost::new(HostOptions::from_config(&config));
    let statuses = host.register_all(&config).await.expect("register all");
    assert_eq!(statuses.len(), 2);

    let agent = config.agent("assistant").expect("agent");
    let caller = CallerContext::from_agent(agent);
    assert!(
        host.call_tool("get_weather", json!({}), &caller)
            .await
            .is_ok()
    );
    assert!(
        host.call_tool("add_note", json!({}), &caller)
            .await
            .is_err()
    );

    let status = host.status().await;
    assert_eq!(status.servers[0].name, "notes");
    assert_eq!(status.servers[1].name, "weather");
    assert!(status.servers.iter().all(|server| server.alive));
    host.shutdown().await;
}

#[test]
#[serial]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = OrreryConfig::load(Some(&dir.path().join("absent.toml"))).expect_err("missing");
    assert!(matches!(err, ConfigError::NotFound { .. }));
}
