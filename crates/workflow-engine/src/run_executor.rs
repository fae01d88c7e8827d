//! The Run Executor — drives one run through its steps in topological
//! order to a terminal status (§4.5).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use workflow_model::{
    topological_sort, RunStatus, RunStatusUpdate, StepConfig, StepStatus, WorkflowDefinition,
};
use workflow_storage::{StoreError, WorkflowStore};

use crate::action::ActionRegistry;
use crate::error::EngineError;
use crate::step_executor::{StepExecutor, StepOutcome};
use crate::task_runner::TaskRunner;

pub struct RunExecutor {
    store: Arc<dyn WorkflowStore>,
    step_executor: Arc<StepExecutor>,
}

impl RunExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        task_runner: Arc<dyn TaskRunner>,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        let step_executor = Arc::new(StepExecutor::new(store.clone(), task_runner, actions));
        Self {
            store,
            step_executor,
        }
    }

    /// Drive `run_id` to completion. Safe to call on a run that's already
    /// `running` (the recovery path) — it picks up exactly where the
    /// step rows say work left off.
    #[instrument(skip(self))]
    pub async fn execute_run(&self, run_id: Uuid) -> Result<(), EngineError> {
        let run = match self.store.get_run(run_id).await {
            Ok(run) => run,
            Err(StoreError::RunNotFound(_)) => {
                warn!(%run_id, "run not found, nothing to execute");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if run.status.is_terminal() {
            debug!(%run_id, status = %run.status, "run already terminal, nothing to do");
            return Ok(());
        }

        let workflow = self.store.get_workflow(run.workflow_id).await?;
        let definition = WorkflowDefinition::from_value(&workflow.definition)
            .map_err(|e| EngineError::InvalidDefinition(workflow.id, e.to_string()))?;

        // Defense in depth: the validator already rejected cycles at
        // submission time, but data loaded back out of the store gets
        // re-checked here too (see DESIGN.md).
        topological_sort(&definition)
            .map_err(|e| EngineError::InvalidDefinition(workflow.id, e.to_string()))?;

        let configs: HashMap<String, StepConfig> = definition
            .steps
            .into_iter()
            .map(|s| (s.id, s.config))
            .collect();

        if run.status != RunStatus::Running {
            let mut tx = self.store.begin().await?;
            tx.update_run_status(run.id, RunStatus::Running, RunStatusUpdate::started_now())
                .await?;
            tx.commit().await?;
            info!(%run_id, "run started");
        } else {
            debug!(%run_id, "resuming run already in progress");
        }

        let steps = self.store.get_steps_for_run(run.id).await?;
        let mut run_failed = false;

        for step_stub in &steps {
            if step_stub.status == StepStatus::Completed {
                debug!(step_id = %step_stub.step_id, "step already completed, skipping");
                continue;
            }

            let config = configs.get(&step_stub.step_id).ok_or_else(|| EngineError::UnknownStep {
                run_id: run.id,
                step_id: step_stub.step_id.clone(),
            })?;

            loop {
                // Re-fetch immediately before each attempt to observe
                // `retry_count`/`idempotency_key` written by the previous
                // attempt (possibly by a now-dead process).
                let step = self.store.get_step(step_stub.id).await?;
                match self.step_executor.execute_attempt(&run, &step, config).await? {
                    StepOutcome::Retry => continue,
                    StepOutcome::Completed => break,
                    StepOutcome::Failed => {
                        run_failed = true;
                        break;
                    }
                }
            }

            if run_failed {
                break;
            }
        }

        let final_status = if run_failed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let mut tx = self.store.begin().await?;
        tx.update_run_status(run.id, final_status, RunStatusUpdate::completed_now())
            .await?;
        tx.commit().await?;
        info!(%run_id, status = %final_status, "run finished");
        Ok(())
    }

    /// Entry point for a spawned worker (§9 "background workers"): runs
    /// to completion, attempting a best-effort `failed` finalization and
    /// logging on any unexpected error rather than propagating it — the
    /// caller has no one to propagate to.
    pub async fn run_to_completion(&self, run_id: Uuid) {
        if let Err(err) = self.execute_run(run_id).await {
            error!(%run_id, %err, "run executor failed unexpectedly, attempting best-effort finalization");
            if let Ok(mut tx) = self.store.begin().await {
                let _ = tx
                    .update_run_status(run_id, RunStatus::Failed, RunStatusUpdate::completed_now())
                    .await;
                let _ = tx.commit().await;
            }
        }
    }
}
