use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::AppState;

/// Bearer token check for the `/api` routes. Open when no token is configured.
pub async fn require_auth(State(state): State<AppState>, headers: HeaderMap, request: Request, next: Next) -> Response {
    let Some(expected) = state.dashboard_token.as_deref() else {
        return next.run(request).await;
    };
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(t) if t == expected => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response(),
    }
}
