mod health;

use axum::{routing::get, Router};

use crate::server::AppState;

use health::{health, metrics, stats};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
}
