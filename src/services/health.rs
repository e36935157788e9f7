//! Liveness HTTP server
//!
//! Exposes the liveness endpoints that hosting platforms and the keep-awake
//! loop poll, plus a JSON status document and Prometheus metrics.

use crate::coordination::ShutdownToken;
use crate::domain::SupervisorState;
use crate::services::Metrics;
use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Body of `GET /ping`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingResponse {
    pub status: String,
    pub timestamp: i64,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: i64,
}

/// Body of `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub gateway: SupervisorState,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub connection_attempts: u64,
    pub reconnections: u64,
    pub events_received: u64,
    pub handler_errors: u64,
    pub notifications_sent: u64,
    pub commands_handled: u64,
    pub pings_succeeded: u64,
    pub pings_failed: u64,
}

/// Shared state for the liveness server
pub struct HealthState {
    pub started_at: DateTime<Utc>,
    supervisor: watch::Receiver<SupervisorState>,
    metrics: Arc<Metrics>,
}

impl HealthState {
    pub fn new(supervisor: watch::Receiver<SupervisorState>, metrics: Arc<Metrics>) -> Self {
        Self {
            started_at: Utc::now(),
            supervisor,
            metrics,
        }
    }

    pub fn gateway_state(&self) -> SupervisorState {
        *self.supervisor.borrow()
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    pub fn status(&self) -> StatusResponse {
        let m = &self.metrics;
        StatusResponse {
            gateway: self.gateway_state(),
            started_at: self.started_at,
            uptime_seconds: self.uptime_seconds(),
            latency_ms: m.latency_ms(),
            connection_attempts: m.connection_attempts.load(Ordering::Relaxed),
            reconnections: m.gateway_reconnections.load(Ordering::Relaxed),
            events_received: m.events_received.load(Ordering::Relaxed),
            handler_errors: m.handler_errors.load(Ordering::Relaxed),
            notifications_sent: m.notifications_sent.load(Ordering::Relaxed),
            commands_handled: m.commands_handled.load(Ordering::Relaxed),
            pings_succeeded: m.pings_succeeded.load(Ordering::Relaxed),
            pings_failed: m.pings_failed.load(Ordering::Relaxed),
        }
    }
}

/// Liveness server
pub struct HealthServer {
    state: Arc<HealthState>,
    addr: SocketAddr,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, addr: SocketAddr) -> Self {
        Self { state, addr }
    }

    /// Routes without the listener, for embedding and tests
    pub fn router(state: Arc<HealthState>) -> Router {
        // Read-only endpoints, so any origin may poll them
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET])
            .allow_headers(Any);

        Router::new()
            .route("/", get(index_handler))
            .route("/ping", get(ping_handler))
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .route("/metrics", get(metrics_handler))
            .layer(cors)
            .with_state(state)
    }

    /// Bind and serve until shutdown
    pub async fn run(&self, shutdown: ShutdownToken) -> crate::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("🌐 Web server listening on {}", listener.local_addr()?);
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener, shutdown: ShutdownToken) -> crate::Result<()> {
        let app = Self::router(Arc::clone(&self.state));
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await
            .map_err(|e| crate::RelayError::Internal(format!("Web server error: {}", e)))?;

        info!("Web server stopped");
        Ok(())
    }

    pub fn state(&self) -> Arc<HealthState> {
        Arc::clone(&self.state)
    }
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

async fn index_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let gateway = state.gateway_state();
    let badge = if gateway == SupervisorState::Connected {
        "🟢 Online"
    } else {
        "🟠 Non connesso"
    };
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="it">
<head><meta charset="utf-8"><title>Voice Relay Bot</title></head>
<body>
<h1>🎙️ Voice Relay Bot</h1>
<p>Stato: <strong>{}</strong> ({})</p>
<p>Attivo da {} secondi</p>
</body>
</html>
"#,
        badge,
        gateway,
        state.uptime_seconds()
    ))
}

async fn ping_handler() -> impl IntoResponse {
    Json(PingResponse {
        status: "alive".to_string(),
        timestamp: unix_now(),
    })
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "discord-bot".to_string(),
        timestamp: unix_now(),
    })
}

async fn status_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(state.status())
}

/// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let connected = state.gateway_state() == SupervisorState::Connected;
    let body = state
        .metrics
        .prometheus(state.uptime_seconds(), connected);

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        body,
    )
}
