//! `SynapServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use synap_auth::TokenVerifier;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::dispatcher::Dispatcher;
use crate::websocket::hub::{Hub, HubStats};
use crate::websocket::session::{Heartbeat, Supervisor, run_ws_session};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection and subscription state.
    pub hub: Arc<Hub>,
    /// Connection lifecycle.
    pub supervisor: Arc<Supervisor>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The realtime notification server.
pub struct SynapServer {
    config: Arc<ServerConfig>,
    hub: Arc<Hub>,
    broadcaster: Arc<Broadcaster>,
    supervisor: Arc<Supervisor>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl SynapServer {
    /// Create a new server.
    ///
    /// `verifier` authenticates `AUTHENTICATE` frames. `metrics` backs the
    /// `/metrics` endpoint; pass `None` when no recorder is installed.
    pub fn new(
        config: ServerConfig,
        verifier: Arc<dyn TokenVerifier>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let hub = Arc::new(Hub::new(config.send_queue_capacity));
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&hub)));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&hub),
            Arc::clone(&broadcaster),
            verifier,
        ));
        let supervisor = Arc::new(Supervisor::new(Arc::clone(&hub), dispatcher));
        Self {
            config: Arc::new(config),
            hub,
            broadcaster,
            supervisor,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            supervisor: Arc::clone(&self.supervisor),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/api/ws", get(ws_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer(&self.config.cors_origin)),
            )
    }

    /// Bind the listener and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%local_addr, "synap server listening");
        Ok((local_addr, handle))
    }

    /// Fan-out API for controllers.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Connection and subscription state.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods([Method::GET])
            .allow_headers(Any),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS origin, cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
    ))
}

/// GET /stats
async fn stats_handler(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws, /api/ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let connections = state.hub.connection_count();
    if connections >= state.config.max_connections {
        warn!(connections, max = state.config.max_connections, "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let heartbeat = Heartbeat {
        interval: state.config.heartbeat_interval(),
        timeout: state.config.heartbeat_timeout(),
    };
    let supervisor = Arc::clone(&state.supervisor);
    let token = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, supervisor, heartbeat, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use synap_auth::JwtVerifier;
    use synap_auth::test_utils::TEST_SECRET;
    use synap_core::{Topic, UserId};
    use tower::ServiceExt;

    fn make_server(config: ServerConfig) -> SynapServer {
        SynapServer::new(config, Arc::new(JwtVerifier::new(TEST_SECRET)), None)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server(ServerConfig::default());
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert!(body["uptimeSecs"].is_number());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn stats_endpoint_reflects_hub() {
        let server = make_server(ServerConfig::default());
        let (conn, _rx) = server.hub().register();
        let _ = server.hub().bind_user_if_open(&conn.id, UserId::from("u1"));
        let _ = server.hub().subscribe(&conn.id, Topic::from("evt42"));

        let (status, body) = get_json(server.router(), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"totalConnections": 1, "totalUsers": 1, "totalTopics": 1})
        );
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_unavailable() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders_text() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = SynapServer::new(
            ServerConfig::default(),
            Arc::new(JwtVerifier::new(TEST_SECRET)),
            Some(handle),
        );
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn ws_endpoint_requires_upgrade() {
        let server = make_server(ServerConfig::default());
        for uri in ["/ws", "/api/ws"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = server.router().oneshot(req).await.unwrap();
            assert!(resp.status().is_client_error(), "{uri} returned {}", resp.status());
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let server = make_server(ServerConfig {
            cors_origin: "https://hack.example".into(),
            ..ServerConfig::default()
        });
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://hack.example")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://hack.example"
        );
    }

    #[test]
    fn invalid_cors_origin_does_not_panic() {
        let _ = cors_layer("bad\norigin");
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_shuts_down() {
        let server = make_server(ServerConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
