use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use common::BotStatus;

use crate::{auth::require_auth, AppState};

const DEFAULT_TRADE_LIMIT: usize = 50;
const MAX_TRADE_LIMIT: usize = 200;

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/positions", get(get_positions))
        .route("/api/positions/:id/close", post(close_position))
        .route("/api/trades", get(get_trades))
        .route("/api/performance", get(get_performance))
        .route("/api/start", post(start))
        .route("/api/stop", post(stop))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

// ─── Status ───────────────────────────────────────────────────────────────────

async fn get_status(State(state): State<AppState>) -> Json<BotStatus> {
    Json(state.engine.status().await)
}

// ─── Positions ────────────────────────────────────────────────────────────────

async fn get_positions(State(state): State<AppState>) -> Json<Value> {
    let positions = state.engine.positions().await;
    Json(json!({
        "total_open": positions.len(),
        "positions": positions,
    }))
}

async fn close_position(State(state): State<AppState>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    info!(%id, "Close requested via API");
    state.engine.request_exit(id.clone()).await;
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted", "position_id": id })))
}

// ─── Trades ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TradesQuery {
    limit: Option<usize>,
}

async fn get_trades(State(state): State<AppState>, Query(q): Query<TradesQuery>) -> Json<Value> {
    let limit = q.limit.unwrap_or(DEFAULT_TRADE_LIMIT).min(MAX_TRADE_LIMIT);
    let trades = state.engine.trades(limit).await;
    Json(json!({ "trades": trades, "limit": limit }))
}

// ─── Performance ──────────────────────────────────────────────────────────────

async fn get_performance(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "stats": state.engine.performance().await,
        "summary": state.engine.summary().await,
    }))
}

// ─── Control ──────────────────────────────────────────────────────────────────

async fn start(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    info!("Start requested via API");
    state.engine.start().await;
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted", "command": "start" })))
}

async fn stop(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    info!("Stop requested via API");
    state.engine.stop().await;
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted", "command": "stop" })))
}
