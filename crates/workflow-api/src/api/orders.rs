//! Demo domain routes: create and inspect orders driven by workflow runs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use workflow_model::Order;
use workflow_storage::WorkflowStore;

use super::common::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WorkflowStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub id: Uuid,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:order_id", get(get_order))
        .with_state(state)
}

/// POST /orders - create a new order in `pending` status. A run's steps
/// advance its status via the action dispatcher as they complete.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses((status = 201, description = "Order created", body = CreateOrderResponse)),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<CreateOrderResponse>), ApiError> {
    let id = state.store.create_order(req.amount).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreateOrderResponse { id }),
    ))
}

/// GET /orders/{id} - fetch an order's current status.
#[utoipa::path(
    get,
    path = "/orders/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = Order),
        (status = 404, description = "Order not found")
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    let order = state.store.get_order(order_id).await?;
    Ok(Json(order))
}
