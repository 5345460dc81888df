// Tool host tests - registering real subprocess servers and routing calls.

#[path = "../common/mod.rs"]
mod common;

use common::{eventually, fake_server, fake_stdio_server, host};
use orrery_core::{
    CallerContext, CapabilityKind, HostError, HostOptions, ToolHost,
};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn register_list_call_unregister() {
    let host = host();
    let status = host
        .register(fake_server("weather", &["--tools", "get_weather,get_forecast"]))
        .await
        .expect("register");
    assert!(status.alive);
    assert_eq!(status.capabilities.tools, 2);

    let caller = CallerContext::unrestricted();
    let names: Vec<String> = host
        .list(Some(CapabilityKind::Tool), &caller)
        .await
        .into_iter()
        .map(|descriptor| descriptor.name)
        .collect();
    assert!(names.contains(&"get_weather".to_string()));

    let result = host
        .call_tool("get_weather", json!({"city": "Paris"}), &caller)
        .await
        .expect("call");
    assert!(!result.is_error);
    assert_eq!(result.text(), r#"weather:get_weather:{"city":"Paris"}"#);

    host.unregister("weather").await.expect("unregister");
    assert!(host.list(None, &caller).await.is_empty());
    assert!(host.status().await.servers.is_empty());
    let err = host
        .call_tool("get_weather", json!({}), &caller)
        .await
        .expect_err("gone");
    assert!(matches!(err, HostError::NotFound { .. }));
}

#[tokio::test]
async fn stdio_transport_kind_spawns_the_same_server() {
    let host = host();
    host.register(fake_stdio_server("plain", &["--tools", "echo"]))
        .await
        .expect("register");
    let result = host
        .call_tool("echo", json!({"x": 1}), &CallerContext::unrestricted())
        .await
        .expect("call");
    assert_eq!(result.text(), r#"plain:echo:{"x":1}"#);
    host.shutdown().await;
}

#[tokio::test]
async fn colliding_names_need_disambiguation() {
    let host = host();
    host.register(fake_server("alpha", &["--tools", "search"]))
        .await
        .expect("alpha");
    host.register(fake_server("beta", &["--tools", "search"]))
        .await
        .expect("beta");

    let err = host
        .call_tool("search", json!({}), &CallerContext::unrestricted())
        .await
        .expect_err("ambiguous");
    match err {
        HostError::Ambiguous { servers, .. } => assert_eq!(servers, vec!["alpha", "beta"]),
        other => panic!("expected ambiguous, got {other:?}"),
    }

    let restricted = CallerContext::unrestricted().with_servers(vec!["beta".into()]);
    let result = host
        .call_tool("search", json!({}), &restricted)
        .await
        .expect("restricted caller resolves");
    assert!(result.text().starts_with("beta:search"));

    let pinned = CallerContext::unrestricted().pin("search", "alpha");
    let result = host
        .call_tool("search", json!({}), &pinned)
        .await
        .expect("pinned caller resolves");
    assert!(result.text().starts_with("alpha:search"));

    host.shutdown().await;
}

#[tokio::test]
async fn server_exclude_beats_caller_allow_list() {
    let host = host();
    let config = fake_server("files", &["--tools", "read_file,delete_file"])
        .with_exclude(vec!["delete_file".into()]);
    host.register(config).await.expect("register");

    let allowed = CallerContext::unrestricted().with_servers(vec!["files".into()]);
    let err = host
        .call_tool("delete_file", json!({}), &allowed)
        .await
        .expect_err("excluded");
    assert!(matches!(err, HostError::NotFound { .. }));

    let narrowed = CallerContext::unrestricted().with_excluded(vec!["read_file".into()]);
    assert!(host.call_tool("read_file", json!({}), &narrowed).await.is_err());
    assert!(
        host.call_tool("read_file", json!({}), &CallerContext::unrestricted())
            .await
            .is_ok()
    );

    // the direct path skips filtering but not the server
    let direct = host
        .call_on("files", CapabilityKind::Tool, "delete_file", json!({}))
        .await
        .expect("direct call");
    assert!(direct.text().starts_with("files:delete_file"));
    host.shutdown().await;
}

#[tokio::test]
async fn server_errors_are_typed() {
    let host = host();
    host.register(fake_server(
        "flaky",
        &["--tools", "boom,refuse", "--fail-tool", "boom", "--error-tool", "refuse"],
    ))
    .await
    .expect("register");
    let caller = CallerContext::unrestricted();

    let err = host
        .call_tool("boom", json!({}), &caller)
        .await
        .expect_err("rpc error");
    assert!(matches!(err, HostError::ToolExecution { code: -32000, .. }));

    let refused = host
        .call_tool("refuse", json!({}), &caller)
        .await
        .expect("isError is still a result");
    assert!(refused.is_error);
    host.shutdown().await;
}

#[tokio::test]
async fn hanging_handshake_hits_registration_timeout() {
    let host = host();
    let config = fake_server("sleepy", &["--tools", "x", "--hang-init"])
        .with_registration_timeout(Duration::from_millis(300));

    let err = host.register(config).await.expect_err("timeout");
    assert!(matches!(err, HostError::RegistrationTimeout { .. }));
    assert!(host.status().await.servers.is_empty());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let host = host();
    host.register(fake_server("once", &["--tools", "x"]))
        .await
        .expect("first");
    let err = host
        .register(fake_server("once", &["--tools", "x"]))
        .await
        .expect_err("second");
    assert!(matches!(err, HostError::AlreadyRegistered { .. }));
    host.shutdown().await;
}

#[tokio::test]
async fn slow_tool_times_out_without_killing_the_session() {
    let host = host();
    let config = fake_server("slow", &["--tools", "wait,quick", "--slow-tool", "wait:2000"])
        .with_timeout(Duration::from_millis(300));
    host.register(config).await.expect("register");
    let caller = CallerContext::unrestricted();

    let err = host
        .call_tool("wait", json!({}), &caller)
        .await
        .expect_err("timeout");
    assert!(matches!(err, HostError::Timeout { .. }));

    let status = host.status().await;
    assert!(status.servers[0].alive);
    host.shutdown().await;
}

#[tokio::test]
async fn dead_session_withdraws_capabilities() {
    let host = host();
    host.register(fake_server("fragile", &["--tools", "crash,other", "--exit-on-call", "crash"]))
        .await
        .expect("register");
    let caller = CallerContext::unrestricted();

    let err = host
        .call_tool("crash", json!({}), &caller)
        .await
        .expect_err("server died");
    assert!(matches!(err, HostError::Connection { .. }));

    let (host_ref, caller_ref) = (&host, &caller);
    let withdrawn = eventually(Duration::from_secs(5), move || async move {
        host_ref.list(None, caller_ref).await.is_empty()
    })
    .await;
    assert!(withdrawn, "capabilities of a dead session must disappear");

    let status = host.status().await;
    assert_eq!(status.servers.len(), 1);
    assert!(!status.servers[0].alive);

    let err = host
        .call_on("fragile", CapabilityKind::Tool, "other", json!({}))
        .await
        .expect_err("dead session");
    assert!(matches!(err, HostError::Connection { .. }));

    host.unregister("fragile").await.expect("unregister dead");
}

#[tokio::test]
async fn routed_call_to_dead_server_reports_connection_until_unregistered() {
    let host = host();
    host.register(fake_server("fragile", &["--tools", "crash,other", "--exit-on-call", "crash"]))
        .await
        .expect("register");
    let caller = CallerContext::unrestricted();

    host.call_tool("crash", json!({}), &caller)
        .await
        .expect_err("server died");
    let host_ref = &host;
    let dead = eventually(Duration::from_secs(5), move || async move {
        !host_ref.status().await.servers[0].alive
    })
    .await;
    assert!(dead);

    let err = host
        .call_tool("other", json!({}), &caller)
        .await
        .expect_err("dead owner");
    assert!(
        matches!(err, HostError::Connection { ref server, .. } if server == "fragile"),
        "got {err:?}"
    );
    assert!(matches!(
        host.call_tool("never_listed", json!({}), &caller).await,
        Err(HostError::NotFound { .. })
    ));

    host.unregister("fragile").await.expect("unregister dead");
    assert!(matches!(
        host.call_tool("other", json!({}), &caller).await,
        Err(HostError::NotFound { .. })
    ));
}

#[tokio::test]
async fn in_flight_call_fails_when_its_server_is_unregistered() {
    let host = host();
    host.register(fake_server("slow", &["--tools", "wait", "--slow-tool", "wait:2000"]))
        .await
        .expect("register");

    let pending = {
        let host = host.clone();
        tokio::spawn(async move {
            host.call_tool("wait", json!({}), &CallerContext::unrestricted())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    host.unregister("slow").await.expect("unregister");

    let err = pending
        .await
        .expect("call task")
        .expect_err("in-flight call");
    assert!(matches!(err, HostError::Connection { .. }), "got {err:?}");
    assert!(host.status().await.servers.is_empty());
}

#[tokio::test]
async fn unanswered_keep_alive_closes_the_session() {
    let host = host();
    let config = fake_server("quiet", &["--tools", "echo", "--ignore-ping"])
        .with_keep_alive(Duration::from_millis(200))
        .with_timeout(Duration::from_millis(300));
    host.register(config).await.expect("register");
    let caller = CallerContext::unrestricted();

    let host_ref = &host;
    let closed = eventually(Duration::from_secs(5), move || async move {
        let status = host_ref.status().await;
        !status.servers[0].alive && status.capability_count == 0
    })
    .await;
    assert!(closed, "a session that stops answering pings must be closed");
    assert!(host.list(None, &caller).await.is_empty());
    assert!(matches!(
        host.call_tool("echo", json!({}), &caller).await,
        Err(HostError::Connection { .. })
    ));
    host.unregister("quiet").await.expect("unregister");
}

#[tokio::test]
async fn answered_keep_alive_leaves_the_session_up() {
    let host = host();
    let config = fake_server("chatty", &["--tools", "echo"])
        .with_keep_alive(Duration::from_millis(100));
    host.register(config).await.expect("register");

    tokio::time::sleep(Duration::from_millis(600)).await;

    let status = host.status().await;
    assert!(status.servers[0].alive);
    assert_eq!(status.servers[0].capabilities.tools, 1);
    host.call_tool("echo", json!({}), &CallerContext::unrestricted())
        .await
        .expect("still callable");
    host.shutdown().await;
}

#[tokio::test]
async fn prompts_and_resources_route_through_the_guard() {
    let host = host();
    host.register(fake_server(
        "docs",
        &[
            "--prompts",
            "summarize",
            "--resources",
            "file:///srv/docs/guide.md,file:///srv/private/keys.txt",
        ],
    ))
    .await
    .expect("register");

    let caller = CallerContext::unrestricted().with_roots(vec!["file:///srv/docs".into()]);
    let prompt = host
        .get_prompt("summarize", json!({"topic": "tokio"}), &caller)
        .await
        .expect("prompt");
    assert_eq!(prompt.text(), "summarize about tokio");

    let guide = host
        .read_resource("file:///srv/docs/guide.md", &caller)
        .await
        .expect("inside root");
    assert_eq!(guide.text(), "contents of file:///srv/docs/guide.md");

    let by_name = host.read_resource("guide.md", &caller).await.expect("by name");
    assert_eq!(by_name.text(), guide.text());

    let err = host
        .read_resource("file:///srv/private/keys.txt", &caller)
        .await
        .expect_err("outside root");
    assert!(matches!(err, HostError::SecurityViolation { .. }));

    let err = host
        .read_resource("keys.txt", &caller)
        .await
        .expect_err("outside root by name");
    assert!(matches!(err, HostError::SecurityViolation { .. }));
    host.shutdown().await;
}

#[tokio::test]
async fn paginated_listing_is_fully_discovered() {
    let host = host();
    let status = host
        .register(fake_server("many", &["--tools", "t1,t2,t3,t4,t5", "--page-size", "2"]))
        .await
        .expect("register");
    assert_eq!(status.capabilities.tools, 5);
    host.shutdown().await;
}

#[tokio::test]
async fn list_changed_refreshes_the_registry() {
    let host = host();
    host.register(fake_server("growing", &["--tools", "first", "--announce-tool", "second"]))
        .await
        .expect("register");
    let caller = CallerContext::unrestricted();

    host.call_tool("first", json!({}), &caller)
        .await
        .expect("first call");
    let (host_ref, caller_ref) = (&host, &caller);
    let refreshed = eventually(Duration::from_secs(5), move || async move {
        host_ref
            .resolve(CapabilityKind::Tool, "second", caller_ref)
            .await
            .is_ok()
    })
    .await;
    assert!(refreshed);
    host.shutdown().await;
}

#[tokio::test]
async fn server_can_ask_for_host_roots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host = ToolHost::new(HostOptions {
        roots: vec![dir.path().to_path_buf()],
    });
    host.register(fake_server("curious", &["--ask-roots"]))
        .await
        .expect("register");

    let result = host
        .call_tool("show_roots", json!({}), &CallerContext::unrestricted())
        .await
        .expect("call");
    assert!(result.text().contains(&format!("file://{}", dir.path().display())));
    host.shutdown().await;
}

#[tokio::test]
async fn instructions_and_status_are_reported() {
    let host = host();
    host.register(fake_server(
        "guide",
        &["--tools", "x", "--instructions", "Prefer metric units."],
    ))
    .await
    .expect("register");

    assert_eq!(
        host.server_instructions("guide").await.as_deref(),
        Some("Prefer metric units.")
    );
    let status = host.status().await;
    assert_eq!(status.capability_count, 1);
    assert_eq!(
        status.servers[0].server_info.as_ref().and_then(|info| info["name"].as_str()),
        Some("guide")
    );

    host.shutdown().await;
    assert!(host.status().await.servers.is_empty());
}
