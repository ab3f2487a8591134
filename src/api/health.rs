//! Health check and statistics endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::hub::RegistryStats;
use crate::metrics::encode_metrics;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: RegistryStats,
    pub online_users: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let hub = state.router.hub();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: hub.registry.stats(),
        online_users: hub.presence.len(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: RegistryStats,
    pub online_users: Vec<String>,
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let hub = state.router.hub();

    Json(StatsResponse {
        connections: hub.registry.stats(),
        online_users: hub.presence.snapshot(),
    })
}

pub async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
