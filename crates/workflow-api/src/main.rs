//! Durable workflow engine HTTP server.
//!
//! Connects to Postgres, runs migrations, recovers every run left
//! `running` by a previous process (§4.6), then starts accepting
//! requests.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use workflow_engine::{ActionRegistry, RecoveryCoordinator, RunExecutor, SimulatedTaskRunner};
use workflow_storage::{run_migrations, PostgresStore, WorkflowStore};

use workflow_api::api;
use workflow_api::config::ApiConfig;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::workflows::create_workflow,
        api::workflows::list_workflows,
        api::workflows::get_workflow,
        api::runs::create_run,
        api::runs::list_runs,
        api::runs::get_run,
        api::orders::create_order,
        api::orders::get_order,
    ),
    components(schemas(
        workflow_model::Workflow,
        workflow_model::WorkflowSummary,
        workflow_model::WorkflowDefinition,
        workflow_model::StepDefinition,
        workflow_model::StepConfig,
        workflow_model::Run,
        workflow_model::RunWithWorkflowName,
        workflow_model::StepView,
        workflow_model::RunStatus,
        workflow_model::StepStatus,
        workflow_model::Order,
        workflow_model::OrderStatus,
        api::workflows::CreateWorkflowRequest,
        api::workflows::CreateWorkflowResponse,
        api::runs::CreateRunRequest,
        api::runs::RunDetail,
        api::orders::CreateOrderRequest,
        api::orders::CreateOrderResponse,
        api::common::ErrorResponse,
    )),
    tags(
        (name = "workflows", description = "Workflow definition endpoints"),
        (name = "runs", description = "Workflow run endpoints"),
        (name = "orders", description = "Demo order endpoints driven by workflow runs"),
    ),
    info(
        title = "Durable Workflow Engine API",
        version = "0.1.0",
        description = "Submit workflow definitions, start runs, and track steps to completion."
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| tracing_subscriber::EnvFilter::new("workflow_api=debug,workflow_engine=debug"),
        ))
        .init();

    let config = ApiConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    run_migrations(&pool).await?;
    tracing::info!("connected to database, migrations applied");

    let store: Arc<dyn WorkflowStore> = Arc::new(PostgresStore::new(pool));
    let task_runner = Arc::new(SimulatedTaskRunner);
    let actions = Arc::new(ActionRegistry::with_demo_actions());
    let run_executor = Arc::new(RunExecutor::new(store.clone(), task_runner, actions));

    let recovery = RecoveryCoordinator::new(store.clone(), run_executor.clone());
    recovery.recover().await?;
    tracing::info!("startup recovery complete");

    let app = workflow_api::build_app(store, run_executor)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
