//! Workflow definition routes: submit, list, and fetch by id.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use workflow_model::{Workflow, WorkflowDefinition, WorkflowSummary};
use workflow_storage::WorkflowStore;

use super::common::{ApiError, ListResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WorkflowStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }
}

/// Request body for `POST /workflows`: the definition is validated and
/// then persisted byte-for-byte as submitted.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub steps: Vec<workflow_model::StepDefinition>,
}

#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct CreateWorkflowResponse {
    pub id: Uuid,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows", post(create_workflow).get(list_workflows))
        .route("/workflows/:workflow_id", get(get_workflow))
        .with_state(state)
}

/// POST /workflows - submit a new workflow definition.
///
/// Rejects the submission before it ever reaches the store: empty step
/// lists, duplicate step ids, dangling dependencies, and cycles all fail
/// validation (§4.1).
#[utoipa::path(
    post,
    path = "/workflows",
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Workflow created", body = CreateWorkflowResponse),
        (status = 400, description = "Definition failed validation")
    ),
    tag = "workflows"
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<(axum::http::StatusCode, Json<CreateWorkflowResponse>), ApiError> {
    let definition = WorkflowDefinition {
        name: req.name.clone(),
        steps: req.steps,
    };
    workflow_validation::validate(&definition)?;

    let value = definition
        .to_value()
        .map_err(ApiError::MalformedDefinition)?;
    let id = state.store.create_workflow(&req.name, value).await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreateWorkflowResponse { id }),
    ))
}

/// GET /workflows - list workflow summaries. Never includes `definition`.
#[utoipa::path(
    get,
    path = "/workflows",
    responses((status = 200, description = "Workflow summaries", body = ListResponse<WorkflowSummary>)),
    tag = "workflows"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<WorkflowSummary>>, ApiError> {
    let workflows = state.store.list_workflows().await?;
    Ok(Json(workflows.into()))
}

/// GET /workflows/{id} - fetch a workflow, including its definition.
#[utoipa::path(
    get,
    path = "/workflows/{workflow_id}",
    params(("workflow_id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "Workflow found", body = Workflow),
        (status = 404, description = "Workflow not found")
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = state.store.get_workflow(workflow_id).await?;
    Ok(Json(workflow))
}
