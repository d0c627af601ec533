//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::WebError;
use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves:
/// - REST API at `/api/*`
/// - Optional static files for an external frontend build
pub fn build_router(app_state: AppState, static_dir: Option<PathBuf>) -> Router {
    // CORS layer for development (frontend dev server on a different port).
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/sessions", post(api::create_session))
        .route("/api/sessions/{id}", delete(api::delete_session))
        .route("/api/modules", get(api::list_modules))
        .route(
            "/api/sessions/{id}/audit",
            get(api::get_audit).post(api::post_audit),
        )
        .route(
            "/api/sessions/{id}/finance",
            get(api::get_finance).post(api::post_finance),
        )
        .with_state(app_state);

    let mut router = Router::new().merge(api_routes).layer(cors);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
}

/// Bind, spawn the server task and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> Result<SocketAddr, WebError> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|source| WebError::Bind {
            addr: bind_addr,
            source,
        })?;
    let addr = listener.local_addr().map_err(|source| WebError::Bind {
        addr: bind_addr,
        source,
    })?;
    info!("Listening on http://{addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Server stopped: {e}");
        }
    });

    Ok(addr)
}
