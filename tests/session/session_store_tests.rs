// Session store tests - both backends must behave the same behind the trait.

use orrery_session::{
    FileSessionStore, InMemorySessionStore, Message, RetentionPolicy, SessionQuery,
    SessionStoreError, SessionStoreRef, ToolCall, ToolResult,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn backends() -> (Vec<(&'static str, SessionStoreRef)>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = FileSessionStore::open(dir.path().join("sessions"))
        .await
        .expect("open file store");
    let stores: Vec<(&'static str, SessionStoreRef)> = vec![
        ("memory", Arc::new(InMemorySessionStore::new())),
        ("file", Arc::new(file)),
    ];
    (stores, dir)
}

fn exchange() -> Vec<Message> {
    vec![
        Message::user("Weather in Paris?"),
        Message::assistant_with_calls(
            "",
            vec![ToolCall::new("c1", "get_weather", json!({"city": "Paris"}))],
        ),
        Message::tool_results(vec![ToolResult::success("c1", "sunny")]),
        Message::assistant("It is sunny."),
    ]
}

#[tokio::test]
async fn history_round_trips_in_order() {
    let (stores, _dir) = backends().await;
    for (label, store) in stores {
        let messages = exchange();
        store
            .append("s1", "forecaster", &messages[..2])
            .await
            .expect("first append");
        store
            .append("s1", "forecaster", &messages[2..])
            .await
            .expect("second append");

        let loaded = store.load("s1").await.expect("load");
        assert_eq!(loaded, messages, "{label} store reordered history");

        let record = store.get("s1").await.expect("get").expect("record exists");
        assert_eq!(record.agent_name, "forecaster");
        assert!(record.last_updated >= record.created_at);
    }
}

#[tokio::test]
async fn unknown_sessions_are_empty_and_blank_ids_rejected() {
    let (stores, _dir) = backends().await;
    for (label, store) in stores {
        assert!(store.load("nobody").await.expect("load").is_empty(), "{label}");
        assert!(store.get("nobody").await.expect("get").is_none(), "{label}");
        assert!(!store.delete("nobody").await.expect("delete"), "{label}");

        let err = store
            .append("  ", "agent", &[Message::user("hi")])
            .await
            .expect_err("blank id");
        assert!(
            matches!(err, SessionStoreError::InvalidSessionId { .. }),
            "{label}: {err}"
        );
    }
}

#[tokio::test]
async fn listing_filters_and_pages_newest_first() {
    let (stores, _dir) = backends().await;
    for (label, store) in stores {
        for (id, agent) in [("a", "planner"), ("b", "writer"), ("c", "planner"), ("d", "planner")] {
            store
                .append(id, agent, &[Message::user(format!("hello from {id}"))])
                .await
                .expect("append");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let page = store
            .list(&SessionQuery::for_agent("planner").page(0, 2))
            .await
            .expect("list");
        assert_eq!(page.total, 3, "{label}");
        let ids: Vec<&str> = page
            .sessions
            .iter()
            .map(|summary| summary.session_id.as_str())
            .collect();
        assert_eq!(ids, vec!["d", "c"], "{label}");

        let everything = store.list(&SessionQuery::default()).await.expect("list all");
        assert_eq!(everything.total, 4, "{label}");
    }
}

#[tokio::test]
async fn cleanup_keeps_the_most_recent_sessions() {
    let (stores, _dir) = backends().await;
    for (label, store) in stores {
        for id in ["old", "middle", "new"] {
            store
                .append(id, "agent", &[Message::user(id)])
                .await
                .expect("append");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let removed = store
            .cleanup(&RetentionPolicy {
                max_age: None,
                max_count: Some(2),
            })
            .await
            .expect("cleanup");
        assert_eq!(removed, 1, "{label}");
        assert!(store.get("old").await.expect("get").is_none(), "{label}");
        assert!(store.get("new").await.expect("get").is_some(), "{label}");

        assert!(store.delete("middle").await.expect("delete"), "{label}");
        assert_eq!(
            store.list(&SessionQuery::default()).await.expect("list").total,
            1,
            "{label}"
        );
    }
}
