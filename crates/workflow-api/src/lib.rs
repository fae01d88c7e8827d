//! Router assembly, shared by the binary entry point and integration
//! tests.

pub mod api;
pub mod config;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use workflow_engine::RunExecutor;
use workflow_storage::WorkflowStore;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Assemble the full application router from a store and run executor.
/// Separated from `main` so tests can build the same router over an
/// in-memory store.
pub fn build_app(store: Arc<dyn WorkflowStore>, run_executor: Arc<RunExecutor>) -> Router {
    let workflows_state = api::workflows::AppState::new(store.clone());
    let runs_state = api::runs::AppState::new(store.clone(), run_executor);
    let orders_state = api::orders::AppState::new(store);

    let api_routes = Router::new()
        .merge(api::workflows::routes(workflows_state))
        .merge(api::runs::routes(runs_state))
        .merge(api::orders::routes(orders_state));

    Router::new()
        .route("/healthz", get(health))
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}
