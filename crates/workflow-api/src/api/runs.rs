//! Run routes: start a run of a workflow, list runs, fetch a run with its steps.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use workflow_engine::RunExecutor;
use workflow_model::{RunWithWorkflowName, StepView};
use workflow_storage::WorkflowStore;

use super::common::{ApiError, ListResponse};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WorkflowStore>,
    pub run_executor: Arc<RunExecutor>,
}

impl AppState {
    pub fn new(store: Arc<dyn WorkflowStore>, run_executor: Arc<RunExecutor>) -> Self {
        Self {
            store,
            run_executor,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateRunRequest {
    /// Optional order to drive through the demo action handlers as this
    /// run's steps complete.
    #[serde(default)]
    pub order_id: Option<Uuid>,
}

/// Full view of a run, including its steps — never leaks `run_id` or
/// `idempotency_key` on the nested steps (`StepView` already strips them).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: RunWithWorkflowName,
    pub steps: Vec<StepView>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows/:workflow_id/runs", post(create_run))
        .route("/runs", get(list_runs))
        .route("/runs/:run_id", get(get_run))
        .with_state(state)
}

/// POST /workflows/{workflow_id}/runs - start a new run.
///
/// Persists the run and its step rows (ordered by the definition's
/// topological sort), then hands the run id to a background worker and
/// returns the freshly created run detail — `202 Accepted`, since the
/// request returns as soon as the run is durably recorded, not when it
/// finishes (§9 "background workers").
#[utoipa::path(
    post,
    path = "/workflows/{workflow_id}/runs",
    params(("workflow_id" = Uuid, Path, description = "Workflow id")),
    request_body = CreateRunRequest,
    responses(
        (status = 202, description = "Run accepted", body = RunDetail),
        (status = 404, description = "Workflow not found"),
        (status = 400, description = "Stored definition no longer validates")
    ),
    tag = "runs"
)]
pub async fn create_run(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<CreateRunRequest>,
) -> Result<(axum::http::StatusCode, Json<RunDetail>), ApiError> {
    let workflow = state.store.get_workflow(workflow_id).await?;
    let definition = workflow_model::WorkflowDefinition::from_value(&workflow.definition)
        .map_err(ApiError::MalformedDefinition)?;
    workflow_validation::validate(&definition)?;
    let sorted = workflow_model::topological_sort(&definition)?;

    let run_id = state.store.create_run(workflow_id, req.order_id).await?;
    let new_steps: Vec<workflow_storage::NewStep> = sorted
        .iter()
        .enumerate()
        .map(|(i, s)| workflow_storage::NewStep {
            step_id: s.id.clone(),
            step_index: i as i32,
            max_retries: s.config.max_retries as i32,
        })
        .collect();
    state.store.create_steps(run_id, &new_steps).await?;

    let executor = Arc::clone(&state.run_executor);
    tokio::spawn(async move {
        executor.run_to_completion(run_id).await;
    });

    let run = state.store.get_run(run_id).await?;
    let steps = state.store.get_steps_for_run(run_id).await?;
    let detail = RunDetail {
        run: RunWithWorkflowName {
            run,
            workflow_name: workflow.name,
        },
        steps: steps.iter().map(StepView::from).collect(),
    };

    Ok((axum::http::StatusCode::ACCEPTED, Json(detail)))
}

/// GET /runs - list every run, newest first, joined with workflow name.
#[utoipa::path(
    get,
    path = "/runs",
    responses((status = 200, description = "Runs", body = ListResponse<RunWithWorkflowName>)),
    tag = "runs"
)]
pub async fn list_runs(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<RunWithWorkflowName>>, ApiError> {
    let runs = state.store.list_runs().await?;
    Ok(Json(runs.into()))
}

/// GET /runs/{id} - a run's status plus its steps.
#[utoipa::path(
    get,
    path = "/runs/{run_id}",
    params(("run_id" = Uuid, Path, description = "Run id")),
    responses(
        (status = 200, description = "Run detail", body = RunDetail),
        (status = 404, description = "Run not found")
    ),
    tag = "runs"
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunDetail>, ApiError> {
    let run = state.store.get_run(run_id).await?;
    let workflow = state.store.get_workflow(run.workflow_id).await?;
    let steps = state.store.get_steps_for_run(run_id).await?;
    Ok(Json(RunDetail {
        run: RunWithWorkflowName {
            run,
            workflow_name: workflow.name,
        },
        steps: steps.iter().map(StepView::from).collect(),
    }))
}
