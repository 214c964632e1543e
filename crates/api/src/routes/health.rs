use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Health check endpoint, no auth required. `healthy` turns false once the
/// last completed cycle is older than the staleness window.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let status = state.engine.status().await;
    Json(json!({
        "status": if status.is_healthy { "ok" } else { "degraded" },
        "engine": state.engine.state().await.to_string(),
        "mode": status.mode.to_string(),
        "healthy": status.is_healthy,
        "last_heartbeat": status.last_heartbeat,
    }))
}
