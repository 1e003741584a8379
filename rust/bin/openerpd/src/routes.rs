//! Route registration: module routes plus system endpoints.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use openerp_core::Module;
use tracing::info;

/// Build the complete router: system endpoints at the root and every
/// module's routes merged under `/api`.
pub fn build_router(modules: &[&dyn Module]) -> Router {
    let mut api = Router::new();
    for module in modules {
        info!(module = module.name(), "mounting module routes under /api");
        api = api.merge(module.routes());
    }

    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .nest("/api", api)
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": "openerpd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
