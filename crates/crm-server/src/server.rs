//! `CrmServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::context::{RealtimeContext, RealtimeDeps};
use crate::dashboard::DashboardPushProducer;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// WebSocket endpoint path.
pub const WS_PATH: &str = "/api/v1/ws/connect";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    ctx: Arc<RealtimeContext>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

/// The realtime hub server.
pub struct CrmServer {
    ctx: Arc<RealtimeContext>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl CrmServer {
    /// Create a server around the given collaborators.
    pub fn new(config: ServerConfig, deps: RealtimeDeps, metrics: PrometheusHandle) -> Self {
        Self {
            ctx: Arc::new(RealtimeContext::new(config, deps)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: self.ctx.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route(WS_PATH, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address and the server task. The task finishes once
    /// the shutdown token fires and every session has been closed.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.ctx.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "crm hub listening");

        let router = self.router();
        let token = self.shutdown.token();
        let registry = self.ctx.registry.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                token.cancelled().await;
                let closed = registry.close_all(close_code::AWAY, "server_shutdown").await;
                info!(closed, "closed live sessions for shutdown");
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "server error");
            }
        });
        Ok((addr, handle))
    }

    /// Start the dashboard push producer, if an interval is configured.
    pub fn spawn_dashboard(&self) -> Option<JoinHandle<()>> {
        let interval = self.ctx.config.dashboard_interval?;
        let producer =
            DashboardPushProducer::new(self.ctx.registry.clone(), self.ctx.snapshots.clone(), interval);
        Some(tokio::spawn(producer.run(self.shutdown.token())))
    }

    /// Shared realtime context.
    pub fn context(&self) -> &Arc<RealtimeContext> {
        &self.ctx
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

/// GET /api/v1/ws/connect?token=…
///
/// The token is resolved before upgrading. A rejected token still completes
/// the upgrade so the client sees a 1008 close rather than an HTTP error.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Response {
    let ws = ws.max_message_size(state.ctx.config.max_message_bytes);
    let token = query.token.unwrap_or_default();

    match state.ctx.identity.resolve(&token) {
        Ok(user_id) => {
            let ctx = state.ctx.clone();
            ws.on_upgrade(move |socket| run_ws_session(socket, user_id, ctx))
        }
        Err(e) => {
            warn!(error = %e, "rejecting websocket handshake");
            ws.on_upgrade(|mut socket| async move {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::POLICY,
                        reason: "unauthorized".into(),
                    })))
                    .await;
            })
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.ctx.live_sessions(),
        state.ctx.registry.connection_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    crate::metrics::render(&state.metrics)
}
