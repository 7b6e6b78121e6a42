//! HTTP gateway for TabHive.
//!
//! Endpoints:
//!
//! - `GET  /health`              — Liveness probe
//! - `GET  /v1/commands`         — The command catalog
//! - `POST /v1/command`          — Run one command as an external caller
//! - `GET  /v1/snapshot`         — The current snapshot
//! - `GET  /v1/snapshot/stream`  — SSE stream of snapshots as they are published
//!
//! Every `/v1` request is an external call. The caller's origin is taken from
//! the `Origin` header; a request without one is rejected.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info};

use tabhive_bridge::{Caller, CommandRequest, ExternalBridge};
use tabhive_config::AppConfig;
use tabhive_core::envelope::Envelope;
use tabhive_security::OriginPolicy;

/// Request bodies above this size are refused.
const BODY_LIMIT: usize = 1024 * 1024;

/// Shared state for the gateway.
pub struct GatewayState {
    pub bridge: Arc<ExternalBridge>,
    pub config: AppConfig,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(bridge: Arc<ExternalBridge>, config: AppConfig) -> SharedState {
        Arc::new(Self { bridge, config })
    }
}

/// Build the router with every gateway route.
pub fn build_router(state: SharedState) -> Router {
    let policy = OriginPolicy::new(state.config.bridge.allowed_origins.iter().cloned());
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| policy.check_origin(origin).is_allowed())
        }))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    let v1 = Router::new()
        .route("/commands", get(catalog_handler))
        .route("/command", post(command_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/snapshot/stream", get(snapshot_stream_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Bind to the configured address and serve until the process exits.
pub async fn start(state: SharedState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// The caller as claimed by the `Origin` header. Missing or non-UTF-8
/// headers become an empty origin, which the allowlist always rejects.
fn caller_from(headers: &HeaderMap) -> Caller {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    Caller::external(origin)
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn catalog_handler() -> Json<serde_json::Value> {
    Json(ExternalBridge::help())
}

async fn command_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<CommandRequest>,
) -> Json<Envelope> {
    let caller = caller_from(&headers);
    debug!(command = %request.command, "Command received over HTTP");
    Json(state.bridge.handle(&caller, request).await)
}

async fn snapshot_handler(State(state): State<SharedState>, headers: HeaderMap) -> Json<Envelope> {
    let caller = caller_from(&headers);
    let request = CommandRequest::new("getSnapshot", serde_json::Value::Null);
    Json(state.bridge.handle(&caller, request).await)
}

async fn snapshot_stream_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let caller = caller_from(&headers);
    if let Err(e) = state.bridge.authorize(&caller, "snapshot/stream") {
        return (StatusCode::FORBIDDEN, Json(Envelope::failure(e.to_string()))).into_response();
    }

    let rx = state.bridge.engine().snapshot_channel();
    // Lagged receivers skip ahead; the next snapshot supersedes what was missed
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|snapshot| {
            let data = serde_json::to_string(snapshot.as_ref()).unwrap_or_default();
            Ok::<_, Infallible>(SseEvent::default().event(snapshot.reason.clone()).data(data))
        });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
