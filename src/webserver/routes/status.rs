use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    hub::HubMetricsSnapshot,
    logger::{self, LogTag},
    webserver::{state::AppState, utils::success_response},
};

/// Simple health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Hub-wide WebSocket statistics
#[derive(Debug, Clone, Serialize)]
pub struct WsStatsResponse {
    pub active_connections: usize,
    pub metrics: HubMetricsSnapshot,
    pub keys: BTreeMap<String, usize>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyStatsResponse {
    pub key: String,
    pub connections: usize,
}

/// Create status routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws/stats", get(ws_stats))
        .route("/ws/stats/keys/:key", get(ws_key_stats))
}

/// GET /api/health
async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    success_response(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// GET /api/ws/stats
async fn ws_stats(State(state): State<Arc<AppState>>) -> Response {
    let hub = state.hub();
    let response = WsStatsResponse {
        active_connections: hub.active_connection_count(),
        metrics: hub.metrics(),
        keys: hub.key_counts(),
        timestamp: Utc::now(),
    };

    logger::debug(
        LogTag::Webserver,
        &format!(
            "WebSocket stats requested (active={}, keys={})",
            response.active_connections,
            response.keys.len()
        ),
    );

    success_response(response)
}

/// GET /api/ws/stats/keys/:key
async fn ws_key_stats(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let connections = state.hub().connections_for_key(&key);
    success_response(KeyStatsResponse { key, connections })
}
