//! The `WorkflowStore` trait: transactional persistence for workflows,
//! runs, steps, step results, and the demo order entity.

use async_trait::async_trait;
use uuid::Uuid;
use workflow_model::{
    Order, OrderStatus, Run, RunStatus, RunStatusUpdate, RunWithWorkflowName, Step, StepResult,
    StepStatus, StepStatusUpdate, Workflow, WorkflowSummary,
};

use crate::error::StoreError;

/// A single step, as submitted, ready to be written as a row under a
/// freshly created run. Mirrors `StepDefinition` plus the topological
/// position assigned by the caller.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub step_id: String,
    pub step_index: i32,
    pub max_retries: i32,
}

/// An open transaction against a [`WorkflowStore`].
///
/// The Step Executor's crash-safety algorithm composes several writes
/// (a step's status transition, a step result, an order mutation) into
/// one commit. None of these methods commit on their own — only
/// `commit` does, and dropping a transaction without calling it rolls
/// the writes back.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn update_run_status(
        &mut self,
        id: Uuid,
        status: RunStatus,
        update: RunStatusUpdate,
    ) -> Result<(), StoreError>;

    async fn update_step_status(
        &mut self,
        id: Uuid,
        status: StepStatus,
        update: StepStatusUpdate,
    ) -> Result<(), StoreError>;

    /// Fails with `StoreError::DuplicateIdempotencyKey` if a result
    /// already exists under this key.
    async fn insert_step_result(
        &mut self,
        idempotency_key: Uuid,
        step_id: Uuid,
        result_data: Option<serde_json::Value>,
    ) -> Result<(), StoreError>;

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Persistence for the durable workflow engine.
///
/// Implementations must be `Send + Sync + 'static`: runs execute on
/// independent Tokio tasks, each holding a handle to the same store.
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    // ---- Workflows ----------------------------------------------------

    /// Insert a new workflow. Commits.
    async fn create_workflow(
        &self,
        name: &str,
        definition: serde_json::Value,
    ) -> Result<Uuid, StoreError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError>;

    /// Summaries only; never includes `definition`.
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError>;

    // ---- Runs -----------------------------------------------------------

    /// Insert a new run in `pending` status. Commits.
    async fn create_run(
        &self,
        workflow_id: Uuid,
        order_id: Option<Uuid>,
    ) -> Result<Uuid, StoreError>;

    /// Joined with the owning workflow's name, newest first.
    async fn list_runs(&self) -> Result<Vec<RunWithWorkflowName>, StoreError>;

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError>;

    /// All runs currently in `running` status (used by the Recovery
    /// Coordinator at startup).
    async fn list_running_runs(&self) -> Result<Vec<Run>, StoreError>;

    // ---- Steps ----------------------------------------------------------

    /// Insert N step rows in a single commit, `step_index` taken verbatim
    /// from `steps` (the caller has already computed topological order).
    async fn create_steps(&self, run_id: Uuid, steps: &[NewStep]) -> Result<(), StoreError>;

    /// Ordered by `step_index`.
    async fn get_steps_for_run(&self, run_id: Uuid) -> Result<Vec<Step>, StoreError>;

    async fn get_step(&self, id: Uuid) -> Result<Step, StoreError>;

    // ---- Step results -----------------------------------------------------

    async fn check_step_result(
        &self,
        idempotency_key: Uuid,
    ) -> Result<Option<StepResult>, StoreError>;

    // ---- Orders (demo domain) ---------------------------------------------

    /// Insert a new order in `pending` status. Commits.
    async fn create_order(&self, amount: f64) -> Result<Uuid, StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError>;

    // ---- Transactions -----------------------------------------------------

    /// Open a transaction for the mutations in [`StoreTransaction`].
    /// Also used for single-write "does not commit on its own" updates
    /// (e.g. a bare `update_run_status`) — call `begin`, make the one
    /// write, then `commit`.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}
