//! In-memory `WorkflowStore`, the default fixture for engine tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;
use workflow_model::{
    Order, OrderStatus, Run, RunStatus, RunStatusUpdate, RunWithWorkflowName, Step, StepResult,
    StepStatus, StepStatusUpdate, Workflow, WorkflowSummary,
};

use crate::error::StoreError;
use crate::store::{NewStep, StoreTransaction, WorkflowStore};

#[derive(Default)]
struct Tables {
    workflows: HashMap<Uuid, Workflow>,
    runs: HashMap<Uuid, Run>,
    steps: HashMap<Uuid, Step>,
    step_results: HashMap<Uuid, StepResult>,
    orders: HashMap<Uuid, Order>,
}

/// `parking_lot::RwLock<Tables>` behind an `Arc` so transaction handles
/// can hold a clone and mutate through it, same lock strategy as the
/// reference in-memory store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn create_workflow(
        &self,
        name: &str,
        definition: serde_json::Value,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        let workflow = Workflow {
            id,
            name: name.to_string(),
            definition,
            created_at: Utc::now(),
        };
        self.tables.write().workflows.insert(id, workflow);
        Ok(id)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        self.tables
            .read()
            .workflows
            .get(&id)
            .cloned()
            .ok_or(StoreError::WorkflowNotFound(id))
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError> {
        let tables = self.tables.read();
        let mut summaries: Vec<WorkflowSummary> =
            tables.workflows.values().map(WorkflowSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn create_run(
        &self,
        workflow_id: Uuid,
        order_id: Option<Uuid>,
    ) -> Result<Uuid, StoreError> {
        let tables = self.tables.read();
        if !tables.workflows.contains_key(&workflow_id) {
            return Err(StoreError::WorkflowNotFound(workflow_id));
        }
        drop(tables);

        let id = Uuid::now_v7();
        let run = Run {
            id,
            workflow_id,
            order_id,
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        self.tables.write().runs.insert(id, run);
        Ok(id)
    }

    async fn list_runs(&self) -> Result<Vec<RunWithWorkflowName>, StoreError> {
        let tables = self.tables.read();
        let mut joined: Vec<RunWithWorkflowName> = tables
            .runs
            .values()
            .filter_map(|run| {
                tables
                    .workflows
                    .get(&run.workflow_id)
                    .map(|w| RunWithWorkflowName {
                        run: run.clone(),
                        workflow_name: w.name.clone(),
                    })
            })
            .collect();
        joined.sort_by(|a, b| b.run.created_at.cmp(&a.run.created_at));
        Ok(joined)
    }

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        self.tables
            .read()
            .runs
            .get(&id)
            .cloned()
            .ok_or(StoreError::RunNotFound(id))
    }

    async fn list_running_runs(&self) -> Result<Vec<Run>, StoreError> {
        Ok(self
            .tables
            .read()
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Running)
            .cloned()
            .collect())
    }

    async fn create_steps(&self, run_id: Uuid, steps: &[NewStep]) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.runs.contains_key(&run_id) {
            return Err(StoreError::RunNotFound(run_id));
        }
        let now = Utc::now();
        for s in steps {
            let id = Uuid::now_v7();
            tables.steps.insert(
                id,
                Step {
                    id,
                    run_id,
                    step_id: s.step_id.clone(),
                    step_index: s.step_index,
                    status: StepStatus::Pending,
                    idempotency_key: None,
                    retry_count: 0,
                    max_retries: s.max_retries,
                    started_at: None,
                    completed_at: None,
                    error_message: None,
                    created_at: now,
                },
            );
        }
        Ok(())
    }

    async fn get_steps_for_run(&self, run_id: Uuid) -> Result<Vec<Step>, StoreError> {
        let tables = self.tables.read();
        let mut steps: Vec<Step> = tables
            .steps
            .values()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_index);
        Ok(steps)
    }

    async fn get_step(&self, id: Uuid) -> Result<Step, StoreError> {
        self.tables
            .read()
            .steps
            .get(&id)
            .cloned()
            .ok_or(StoreError::StepNotFound(id))
    }

    async fn check_step_result(
        &self,
        idempotency_key: Uuid,
    ) -> Result<Option<StepResult>, StoreError> {
        Ok(self
            .tables
            .read()
            .step_results
            .get(&idempotency_key)
            .cloned())
    }

    async fn create_order(&self, amount: f64) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let order = Order {
            id,
            status: OrderStatus::Pending,
            amount,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().orders.insert(id, order);
        Ok(id)
    }

    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError> {
        self.tables
            .read()
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::OrderNotFound(id))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            ops: Vec::new(),
            staged_result_keys: std::collections::HashSet::new(),
        }))
    }
}

/// One buffered write. `InMemoryTransaction` stages these instead of
/// touching `Tables` directly, so a dropped-without-commit transaction
/// (the action-precondition-failure path in
/// `workflow_engine::step_executor::StepExecutor::commit_success`) really
/// does roll back, matching `PostgresTransaction`'s drop-a-`sqlx::Transaction`
/// semantics.
enum Op {
    UpdateRun {
        id: Uuid,
        status: RunStatus,
        update: RunStatusUpdate,
    },
    UpdateStep {
        id: Uuid,
        status: StepStatus,
        update: StepStatusUpdate,
    },
    InsertStepResult {
        idempotency_key: Uuid,
        step_id: Uuid,
        result_data: Option<serde_json::Value>,
        created_at: chrono::DateTime<Utc>,
    },
    UpdateOrder {
        id: Uuid,
        status: OrderStatus,
    },
}

/// The in-memory store's transaction: writes are staged in `ops` and
/// applied to the shared `Tables` only by `commit`. Dropping the
/// transaction without committing discards `ops` and leaves `Tables`
/// untouched — the same rollback-on-drop contract `PostgresTransaction`
/// gets for free from `sqlx::Transaction`.
struct InMemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    ops: Vec<Op>,
    staged_result_keys: std::collections::HashSet<Uuid>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn update_run_status(
        &mut self,
        id: Uuid,
        status: RunStatus,
        update: RunStatusUpdate,
    ) -> Result<(), StoreError> {
        if !self.tables.read().runs.contains_key(&id) {
            return Err(StoreError::RunNotFound(id));
        }
        self.ops.push(Op::UpdateRun { id, status, update });
        Ok(())
    }

    async fn update_step_status(
        &mut self,
        id: Uuid,
        status: StepStatus,
        update: StepStatusUpdate,
    ) -> Result<(), StoreError> {
        if !self.tables.read().steps.contains_key(&id) {
            return Err(StoreError::StepNotFound(id));
        }
        self.ops.push(Op::UpdateStep { id, status, update });
        Ok(())
    }

    async fn insert_step_result(
        &mut self,
        idempotency_key: Uuid,
        step_id: Uuid,
        result_data: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        if self.staged_result_keys.contains(&idempotency_key)
            || self.tables.read().step_results.contains_key(&idempotency_key)
        {
            return Err(StoreError::DuplicateIdempotencyKey(idempotency_key));
        }
        self.staged_result_keys.insert(idempotency_key);
        self.ops.push(Op::InsertStepResult {
            idempotency_key,
            step_id,
            result_data,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        if !self.tables.read().orders.contains_key(&id) {
            return Err(StoreError::OrderNotFound(id));
        }
        self.ops.push(Op::UpdateOrder { id, status });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for op in self.ops {
            match op {
                Op::UpdateRun { id, status, update } => {
                    if let Some(run) = tables.runs.get_mut(&id) {
                        run.status = status;
                        if let Some(started_at) = update.started_at {
                            run.started_at = Some(started_at);
                        }
                        if let Some(completed_at) = update.completed_at {
                            run.completed_at = Some(completed_at);
                        }
                    }
                }
                Op::UpdateStep { id, status, update } => {
                    if let Some(step) = tables.steps.get_mut(&id) {
                        step.status = status;
                        if let Some(started_at) = update.started_at {
                            step.started_at = Some(started_at);
                        }
                        if let Some(completed_at) = update.completed_at {
                            step.completed_at = Some(completed_at);
                        }
                        if let Some(error_message) = update.error_message {
                            step.error_message = Some(error_message);
                        }
                        if let Some(idempotency_key) = update.idempotency_key {
                            step.idempotency_key = Some(idempotency_key);
                        }
                        if let Some(retry_count) = update.retry_count {
                            step.retry_count = retry_count;
                        }
                    }
                }
                Op::InsertStepResult {
                    idempotency_key,
                    step_id,
                    result_data,
                    created_at,
                } => {
                    tables.step_results.insert(
                        idempotency_key,
                        StepResult {
                            idempotency_key,
                            step_id,
                            result_data,
                            created_at,
                        },
                    );
                }
                Op::UpdateOrder { id, status } => {
                    if let Some(order) = tables.orders.get_mut(&id) {
                        order.status = status;
                        order.updated_at = Utc::now();
                    }
                }
            }
        }
        Ok(())
    }
}
