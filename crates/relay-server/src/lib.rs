//! # relay-server
//!
//! The task relay. Provides:
//!
//! - A WebSocket endpoint (`/socket`) shared by agent sockets and the single
//!   system connection, speaking the JSON packet protocol
//! - A dispatch loop that flushes queued packets to sockets on a fixed tick
//! - Synchronous HTTP endpoints whose replies are produced asynchronously
//!   by the system connection
//! - A Prometheus metrics endpoint

pub mod bridge;
pub mod dispatch;
pub mod metrics;
pub mod mock;
pub mod registry;
pub mod relay;
pub mod router;
pub mod socket;
pub mod store;

pub use bridge::{Submission, SystemRequest};
pub use dispatch::{Delivery, PacketSink, TickReport, send_reliable};
pub use relay::{Connection, ConnectionId, Relay, RelaySettings, RelayState};

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use relay_config::{RelayConfig, ServerConfig};
use relay_core::RelayError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared server state.
pub struct AppState {
    pub config: ServerConfig,
    pub relay: Arc<Relay>,
}

/// Body of every bridged endpoint.
#[derive(Deserialize)]
struct ProviderRequest {
    #[serde(default)]
    provider_data: Value,
}

/// HTTP-facing wrapper around [`RelayError`].
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            RelayError::UpstreamTimeout { request_id } => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "error": "upstream timeout", "request_id": request_id }),
            ),
            RelayError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            RelayError::RequestAbandoned(request_id) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "request abandoned", "request_id": request_id }),
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": other.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the Axum router around an existing relay.
pub fn build_router(config: ServerConfig, relay: Arc<Relay>) -> Router {
    let state = Arc::new(AppState {
        config: config.clone(),
        relay,
    });

    let bridge_routes = Router::new()
        .route("/initial_task_data", post(initial_task_data_handler))
        .route("/register_worker", post(register_worker_handler))
        .route("/request_agent", post(request_agent_handler))
        .route("/submit_onboarding", post(submit_onboarding_handler))
        .route(
            "/submit_task",
            post(submit_task_handler).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        );

    let mut router = Router::new()
        .route("/socket", get(socket::ws_handler))
        .route("/is_alive", get(is_alive_handler))
        .route("/get_timestamp", get(timestamp_handler))
        .route("/metrics", get(metrics_handler))
        .merge(bridge_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

async fn is_alive_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.relay.metrics().inc_http_requests();
    Json(json!({ "status": "Alive!" }))
}

async fn timestamp_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.relay.metrics().inc_http_requests();
    Json(json!({ "timestamp": chrono::Utc::now().timestamp_millis() }))
}

/// Prometheus-compatible metrics endpoint.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    let gauges = state.relay.with_state(|s| metrics::Gauges {
        known_agents: s.agents.len(),
        connected_agents: s.registry.connected_agents(),
        pending_requests: s.pending.len(),
        system_queue_len: s.system_queue.len(),
        system_connected: s.registry.system().is_some(),
    });
    let body = state.relay.metrics().render_prometheus(gauges);
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

async fn initial_task_data_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest>,
) -> Result<Json<Value>, ApiError> {
    bridge_call(&state, SystemRequest::InitialTaskData, req).await
}

async fn register_worker_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest>,
) -> Result<Json<Value>, ApiError> {
    bridge_call(&state, SystemRequest::RegisterWorker, req).await
}

async fn request_agent_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest>,
) -> Result<Json<Value>, ApiError> {
    bridge_call(&state, SystemRequest::RequestAgent, req).await
}

async fn submit_onboarding_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest>,
) -> Result<Json<Value>, ApiError> {
    bridge_call(&state, SystemRequest::SubmitOnboarding, req).await
}

async fn bridge_call(
    state: &AppState,
    kind: SystemRequest,
    req: ProviderRequest,
) -> Result<Json<Value>, ApiError> {
    state.relay.metrics().inc_http_requests();
    match state.relay.request_from_system(kind, req.provider_data).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            state.relay.metrics().inc_http_errors();
            Err(e.into())
        }
    }
}

async fn submit_task_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    state.relay.metrics().inc_http_requests();
    let submission = Submission::from_multipart(multipart).await.map_err(|e| {
        state.relay.metrics().inc_http_errors();
        warn!(error = %e, "rejected task submission");
        ApiError::from(e)
    })?;
    state.relay.submit_task(submission);
    Ok(Json(json!({ "status": "Submitted!" })))
}

/// Start the relay and its HTTP server; returns after a shutdown signal.
pub async fn start_server(config: RelayConfig) -> relay_core::Result<()> {
    let listen = config.server.listen.clone();
    let relay = Relay::new(RelaySettings::from(&config));
    let router = build_router(config.server.clone(), Arc::clone(&relay));

    info!(listen = %listen, "starting relay server");

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| RelayError::Server(format!("failed to bind {}: {}", listen, e)))?;

    let shutdown = relay.shutdown_token();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown.cancelled() => {}
            }
        })
        .await
        .map_err(|e| RelayError::Server(format!("server error: {}", e)))?;

    relay.shutdown();
    Ok(())
}
