//! Health, Metrics and Subscription Admin Endpoint
//!
//! HTTP endpoint for health checks, Prometheus metrics and runtime
//! subscription changes.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (feed must be live)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /subscriptions` - Current subscription set
//! - `POST /subscriptions/subscribe` - Add symbols (`{"symbols": [...]}`)
//! - `POST /subscriptions/unsubscribe` - Remove symbols (`{"symbols": [...]}`)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::EnrichmentQueue;
use crate::domain::subscription::normalize_symbol;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::polygon::{ConnectionState, FeedSupervisor};

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed connection status.
    pub feed: FeedInfo,
    /// Number of subscribed symbols.
    pub subscriptions: usize,
    /// Enrichment backlog.
    pub enrichment: EnrichmentInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed is live.
    Healthy,
    /// Feed is being (re)established.
    Degraded,
    /// Feed is stopped.
    Unhealthy,
}

/// Feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Whether frames are flowing.
    pub connected: bool,
}

/// Enrichment queue status.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentInfo {
    /// Tasks waiting for a worker.
    pub queued: usize,
    /// Queue capacity.
    pub capacity: usize,
}

/// Body for subscribe and unsubscribe requests.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsRequest {
    /// Symbols to add or remove.
    pub symbols: Vec<String>,
}

/// Subscription set, optionally with the symbols a request changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionsResponse {
    /// Symbols actually added or removed by the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
    /// Full subscription set after the request.
    pub symbols: Vec<String>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    supervisor: Arc<FeedSupervisor>,
    enrichment: Arc<EnrichmentQueue>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        supervisor: Arc<FeedSupervisor>,
        enrichment: Arc<EnrichmentQueue>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            supervisor,
            enrichment,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Build the HTTP routes.
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/subscriptions", get(list_subscriptions_handler))
        .route("/subscriptions/subscribe", post(subscribe_handler))
        .route("/subscriptions/unsubscribe", post(unsubscribe_handler))
        .with_state(state)
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.supervisor.state().is_live() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

async fn list_subscriptions_handler(
    State(state): State<Arc<HealthServerState>>,
) -> Json<SubscriptionsResponse> {
    Json(SubscriptionsResponse {
        changed: Vec::new(),
        symbols: state.supervisor.subscriptions(),
    })
}

async fn subscribe_handler(
    State(state): State<Arc<HealthServerState>>,
    Json(request): Json<SymbolsRequest>,
) -> Result<Json<SubscriptionsResponse>, SymbolsRejection> {
    validate_symbols(&request.symbols)?;
    let added = state.supervisor.subscribe(&request.symbols);
    tracing::info!(requested = request.symbols.len(), added = ?added, "Subscribe request");
    Ok(Json(SubscriptionsResponse {
        changed: added,
        symbols: state.supervisor.subscriptions(),
    }))
}

async fn unsubscribe_handler(
    State(state): State<Arc<HealthServerState>>,
    Json(request): Json<SymbolsRequest>,
) -> Result<Json<SubscriptionsResponse>, SymbolsRejection> {
    validate_symbols(&request.symbols)?;
    let removed = state.supervisor.unsubscribe(&request.symbols);
    tracing::info!(requested = request.symbols.len(), removed = ?removed, "Unsubscribe request");
    Ok(Json(SubscriptionsResponse {
        changed: removed,
        symbols: state.supervisor.subscriptions(),
    }))
}

/// 400 response listing the symbols that are not plain tickers.
#[derive(Debug)]
struct SymbolsRejection {
    invalid: Vec<String>,
}

impl IntoResponse for SymbolsRejection {
    fn into_response(self) -> axum::response::Response {
        tracing::warn!(invalid = ?self.invalid, "Rejected subscription request");
        let body = serde_json::json!({
            "error": "invalid symbols",
            "invalid": self.invalid,
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// The whole request is rejected if any symbol is invalid.
fn validate_symbols(symbols: &[String]) -> Result<(), SymbolsRejection> {
    let invalid: Vec<String> = symbols
        .iter()
        .filter(|s| normalize_symbol(s).is_none())
        .cloned()
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(SymbolsRejection { invalid })
    }
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection_state = state.supervisor.state();

    HealthResponse {
        status: determine_health_status(connection_state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed: FeedInfo {
            state: connection_state,
            connected: connection_state.is_live(),
        },
        subscriptions: state.supervisor.subscriptions().len(),
        enrichment: EnrichmentInfo {
            queued: state.enrichment.len(),
            capacity: state.enrichment.capacity(),
        },
    }
}

const fn determine_health_status(state: ConnectionState) -> HealthStatus {
    match state {
        ConnectionState::Live => HealthStatus::Healthy,
        ConnectionState::Connecting
        | ConnectionState::Authenticating
        | ConnectionState::Reconnecting => HealthStatus::Degraded,
        ConnectionState::Disconnected => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::{LaneConfig, PersistenceLanes, PersistenceSink};
    use crate::domain::subscription::SubscriptionRegistry;
    use crate::infrastructure::polygon::{Credentials, FeedConfig, FrameDispatcher};
    use crate::infrastructure::storage::InMemoryBarStore;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use test_case::test_case;
    use tower::ServiceExt;

    fn app(cancel: &CancellationToken) -> Router {
        let sink = Arc::new(PersistenceSink::new(Arc::new(InMemoryBarStore::new())));
        let (lanes, _) = PersistenceLanes::spawn(sink, &LaneConfig::default(), cancel);
        let (queue, _rx) = EnrichmentQueue::new(16);
        let queue = Arc::new(queue);
        let dispatcher = Arc::new(FrameDispatcher::new(lanes, Arc::clone(&queue)));
        let supervisor = Arc::new(FeedSupervisor::new(
            FeedConfig::new("ws://127.0.0.1:9/stocks", Credentials::new("k").unwrap()),
            Arc::new(SubscriptionRegistry::with_symbols(["AAPL"])),
            dispatcher,
            cancel.clone(),
        ));
        router(Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            supervisor,
            queue,
        )))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test_case(ConnectionState::Live, HealthStatus::Healthy)]
    #[test_case(ConnectionState::Reconnecting, HealthStatus::Degraded)]
    #[test_case(ConnectionState::Authenticating, HealthStatus::Degraded)]
    #[test_case(ConnectionState::Disconnected, HealthStatus::Unhealthy)]
    fn health_status_follows_feed(state: ConnectionState, expected: HealthStatus) {
        assert_eq!(determine_health_status(state), expected);
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        let cancel = CancellationToken::new();
        let (status, body) = send(
            &app(&cancel),
            Request::get("/healthz").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
        cancel.cancel();
    }

    #[tokio::test]
    async fn not_ready_until_live() {
        let cancel = CancellationToken::new();
        let app = app(&cancel);

        let (ready, _) = send(&app, Request::get("/readyz").body(Body::empty()).unwrap()).await;
        let (health, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;

        assert_eq!(ready, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health, StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["feed"]["state"], "disconnected");
        assert_eq!(json["subscriptions"], 1);
        assert_eq!(json["enrichment"]["capacity"], 16);
        cancel.cancel();
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_round_trip() {
        let cancel = CancellationToken::new();
        let app = app(&cancel);

        let (status, body) = send(
            &app,
            post_json("/subscriptions/subscribe", r#"{"symbols":["msft","AAPL"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let added: SubscriptionsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(added.changed, vec!["MSFT"]);
        assert_eq!(added.symbols, vec!["AAPL", "MSFT"]);

        let (_, body) = send(
            &app,
            post_json("/subscriptions/unsubscribe", r#"{"symbols":["AAPL","TSLA"]}"#),
        )
        .await;
        let removed: SubscriptionsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(removed.changed, vec!["AAPL"]);

        let (_, body) = send(
            &app,
            Request::get("/subscriptions").body(Body::empty()).unwrap(),
        )
        .await;
        let listed: SubscriptionsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed.symbols, vec!["MSFT"]);
        assert!(listed.changed.is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn invalid_symbols_reject_the_whole_request() {
        let cancel = CancellationToken::new();
        let app = app(&cancel);

        let (status, body) = send(
            &app,
            post_json("/subscriptions/subscribe", r#"{"symbols":["MSFT","AAPL,A.*"]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["invalid"], serde_json::json!(["AAPL,A.*"]));

        let (_, body) = send(
            &app,
            Request::get("/subscriptions").body(Body::empty()).unwrap(),
        )
        .await;
        let listed: SubscriptionsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed.symbols, vec!["AAPL"]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let cancel = CancellationToken::new();
        let (status, _) = send(
            &app(&cancel),
            post_json("/subscriptions/subscribe", r#"{"tickers":"AAPL"}"#),
        )
        .await;

        assert!(status.is_client_error());
        cancel.cancel();
    }
}
