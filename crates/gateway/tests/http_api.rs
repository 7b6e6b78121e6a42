//! The gateway's HTTP surface, driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use tabhive_bridge::ExternalBridge;
use tabhive_config::AppConfig;
use tabhive_core::event::LifecycleEvent;
use tabhive_engine::{Engine, InMemoryHost};
use tabhive_gateway::{GatewayState, SharedState, build_router};

const ALLOWED: &str = "https://assistant.example.com";

async fn state_with_agents() -> (SharedState, Arc<InMemoryHost>) {
    let mut config = AppConfig::default();
    config.bridge.allowed_origins = vec!["assistant.example.com".into()];
    let host = Arc::new(InMemoryHost::new());
    let engine = Arc::new(Engine::from_host(&config, host.clone()));

    for (id, url, title) in [
        ("gmail", "https://mail.google.com/mail/u/0/", "Inbox - Gmail"),
        ("docs", "https://docs.rs/axum", "axum - Rust"),
    ] {
        let agent_id = host.open_page(id, url, title);
        engine
            .handle(LifecycleEvent::AgentCreated {
                agent_id: agent_id.clone(),
                url: url.into(),
            })
            .await;
        engine
            .handle(LifecycleEvent::AgentUpdated {
                agent_id,
                url: None,
                title: Some(title.into()),
                status: None,
            })
            .await;
    }

    let bridge = Arc::new(ExternalBridge::from_config(engine, &config.bridge));
    (GatewayState::new(bridge, config), host)
}

fn command(origin: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/command")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn catalog_is_public() {
    let (state, _) = state_with_agents().await;
    let response = build_router(state)
        .oneshot(Request::builder().uri("/v1/commands").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["version"], 1);
    assert_eq!(body["commands"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn command_without_origin_is_rejected() {
    let (state, host) = state_with_agents().await;
    let response = build_router(state.clone())
        .oneshot(command(None, json!({"command": "closeAgents", "args": {"agentId": "gmail"}})))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert!(host.closed().is_empty());
    assert_eq!(state.bridge.engine().agent_count(), 2);
}

#[tokio::test]
async fn http_origin_is_rejected() {
    let (state, host) = state_with_agents().await;
    let response = build_router(state.clone())
        .oneshot(command(
            Some("http://evil.test"),
            json!({"command": "closeAgents", "args": {"agentId": "gmail"}}),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert!(body.get("result").is_none());
    assert!(host.closed().is_empty());
    assert_eq!(host.send_count(), 0);
}

#[tokio::test]
async fn allowed_origin_runs_commands() {
    let (state, host) = state_with_agents().await;
    let response = build_router(state.clone())
        .oneshot(command(
            Some(ALLOWED),
            json!({"command": "closeAgents", "args": {"query": "gmail"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true, "{body}");
    assert_eq!(body["result"]["closed"], json!(["gmail"]));
    assert_eq!(host.closed().len(), 1);
    assert_eq!(state.bridge.engine().agent_count(), 1);
}

#[tokio::test]
async fn snapshot_requires_allowed_origin() {
    let (state, _) = state_with_agents().await;

    let denied = build_router(state.clone())
        .oneshot(Request::builder().uri("/v1/snapshot").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(denied).await["ok"], false);

    let allowed = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/v1/snapshot")
                .header(header::ORIGIN, ALLOWED)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(allowed).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"]["agents"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn snapshot_stream_opens_for_allowed_origin() {
    let (state, _) = state_with_agents().await;
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/v1/snapshot/stream")
                .header(header::ORIGIN, ALLOWED)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let (state, _) = state_with_agents().await;
    let padding = "x".repeat(2 * 1024 * 1024);
    let response = build_router(state)
        .oneshot(command(
            Some(ALLOWED),
            json!({"command": "findAgents", "args": {"query": padding}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
