mod auth;
pub mod routes;

use std::net::SocketAddr;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use engine::EngineHandle;

/// Shared application state injected into every route handler.
///
/// Handlers only read through the engine handle; start, stop and close
/// requests go through its command channel.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    /// Bearer token for `/api` routes. `None` leaves them open.
    pub dashboard_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the Axum API server until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    info!(%addr, "Dashboard API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}
