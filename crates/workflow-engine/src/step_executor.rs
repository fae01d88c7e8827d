//! The Step Executor — the crash-safety epicenter of the engine (§4.4).
//!
//! Executes one attempt of one step. Every state transition here is a
//! single commit; the ordering between "claim key", "check idempotency",
//! "invoke task", and "record result" is exactly the sequence that makes
//! recovery deterministic after a crash at any point. Do not reorder it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use workflow_model::{Run, Step, StepConfig, StepStatus, StepStatusUpdate};
use workflow_storage::WorkflowStore;

use crate::action::ActionRegistry;
use crate::error::EngineError;
use crate::task_runner::{TaskExecutionError, TaskRunner};

/// What happened to one step attempt. The Run Executor loops on `Retry`,
/// advances past the step on `Completed`, and fails the run on `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Retry,
    Failed,
}

pub struct StepExecutor {
    store: Arc<dyn WorkflowStore>,
    task_runner: Arc<dyn TaskRunner>,
    actions: Arc<ActionRegistry>,
}

impl StepExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        task_runner: Arc<dyn TaskRunner>,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            store,
            task_runner,
            actions,
        }
    }

    /// Execute one attempt of `step` under `run`, per `config`. `step`
    /// and `run` must be freshly re-fetched by the caller — this method
    /// trusts the `retry_count`/`idempotency_key` it's handed.
    #[instrument(skip(self, run, config), fields(step_id = %step.step_id, attempt = step.retry_count))]
    pub async fn execute_attempt(
        &self,
        run: &Run,
        step: &Step,
        config: &StepConfig,
    ) -> Result<StepOutcome, EngineError> {
        // 1. Claim an idempotency key and commit `running` before doing
        // any work, so a crash here still leaves the row pointing at the
        // key under which success (if any) was or will be recorded.
        let idempotency_key = step.idempotency_key.unwrap_or_else(Uuid::now_v7);
        {
            let mut tx = self.store.begin().await?;
            tx.update_step_status(
                step.id,
                StepStatus::Running,
                StepStatusUpdate {
                    started_at: if step.started_at.is_none() {
                        Some(Utc::now())
                    } else {
                        None
                    },
                    idempotency_key: Some(idempotency_key),
                    ..Default::default()
                },
            )
            .await?;
            tx.commit().await?;
        }

        // 2. Idempotency check: a result under this key means the work
        // already happened durably, possibly in a crashed prior process.
        if self
            .store
            .check_step_result(idempotency_key)
            .await?
            .is_some()
        {
            debug!(%idempotency_key, "result already recorded, skipping task invocation");
            let mut tx = self.store.begin().await?;
            tx.update_step_status(
                step.id,
                StepStatus::Completed,
                StepStatusUpdate {
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
            tx.commit().await?;
            return Ok(StepOutcome::Completed);
        }

        // 3. Invoke the task body.
        match self.task_runner.run(config).await {
            Ok(result_data) => {
                self.commit_success(step, idempotency_key, result_data, run, config)
                    .await
            }
            Err(err) => self.handle_failure(step, err).await,
        }
    }

    /// Step 4: one atomic commit recording the result, optionally
    /// dispatching the step's action, and marking the step complete.
    async fn commit_success(
        &self,
        step: &Step,
        idempotency_key: Uuid,
        result_data: serde_json::Value,
        run: &Run,
        config: &StepConfig,
    ) -> Result<StepOutcome, EngineError> {
        let mut tx = self.store.begin().await?;
        tx.insert_step_result(idempotency_key, step.id, Some(result_data))
            .await?;

        if let Some(order_id) = run.order_id {
            if let Err(action_err) = self
                .actions
                .dispatch(&config.action, self.store.as_ref(), &mut *tx, order_id)
                .await
            {
                // Dropping `tx` here rolls back the result insert: an
                // action precondition failure must not leave a phantom
                // StepResult behind.
                drop(tx);
                warn!(%idempotency_key, error = %action_err, "action precondition failed");
                return self
                    .handle_failure(step, TaskExecutionError::Action(action_err))
                    .await;
            }
        }

        tx.update_step_status(
            step.id,
            StepStatus::Completed,
            StepStatusUpdate {
                completed_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;
        tx.commit().await?;
        info!(%idempotency_key, "step completed");
        Ok(StepOutcome::Completed)
    }

    /// Step 3's failure branches: retry with a fresh key, or exhaust the
    /// budget and fail the step. Action-precondition failures flow
    /// through here identically to task-runner failures (see DESIGN.md).
    async fn handle_failure(
        &self,
        step: &Step,
        err: TaskExecutionError,
    ) -> Result<StepOutcome, EngineError> {
        let mut tx = self.store.begin().await?;
        if step.retry_count < step.max_retries {
            let fresh_key = Uuid::now_v7();
            tx.update_step_status(
                step.id,
                StepStatus::Pending,
                StepStatusUpdate {
                    retry_count: Some(step.retry_count + 1),
                    idempotency_key: Some(fresh_key),
                    ..Default::default()
                },
            )
            .await?;
            tx.commit().await?;
            debug!(retry_count = step.retry_count + 1, max_retries = step.max_retries, %err, "step attempt failed, retrying");
            Ok(StepOutcome::Retry)
        } else {
            tx.update_step_status(
                step.id,
                StepStatus::Failed,
                StepStatusUpdate {
                    completed_at: Some(Utc::now()),
                    error_message: Some(err.to_string()),
                    ..Default::default()
                },
            )
            .await?;
            tx.commit().await?;
            warn!(%err, "step failed, retry budget exhausted");
            Ok(StepOutcome::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use workflow_model::{OrderStatus, StepStatus};
    use workflow_storage::memory::InMemoryStore;
    use workflow_storage::NewStep;

    /// Scripted task runner: returns the next outcome from a fixed
    /// sequence, for deterministic retry-then-succeed / exhaustion tests
    /// (S2/S3 in the spec this engine implements).
    struct ScriptedTaskRunner {
        outcomes: Mutex<std::collections::VecDeque<Result<(), String>>>,
        invocations: Mutex<u32>,
    }

    impl ScriptedTaskRunner {
        fn new(outcomes: Vec<Result<(), String>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                invocations: Mutex::new(0),
            }
        }

        fn invocation_count(&self) -> u32 {
            *self.invocations.lock().unwrap()
        }
    }

    #[async_trait]
    impl TaskRunner for ScriptedTaskRunner {
        async fn run(&self, config: &StepConfig) -> Result<serde_json::Value, TaskExecutionError> {
            *self.invocations.lock().unwrap() += 1;
            match self.outcomes.lock().unwrap().pop_front() {
                Some(Ok(())) => Ok(serde_json::json!({"action": config.action})),
                Some(Err(msg)) => Err(TaskExecutionError::Failed(msg)),
                None => Err(TaskExecutionError::Failed("no more scripted outcomes".into())),
            }
        }
    }

    fn config(max_retries: i32) -> StepConfig {
        StepConfig {
            action: "noop".to_string(),
            duration_seconds: 0.0,
            fail_probability: 0.0,
            max_retries: max_retries as u32,
        }
    }

    async fn seeded_run_and_step(store: &InMemoryStore, max_retries: i32) -> (Run, Step) {
        let workflow_id = store
            .create_workflow(
                "demo",
                serde_json::json!({"name": "demo", "steps": [{"id": "a", "type": "task", "config": {"action": "noop"}, "depends_on": []}]}),
            )
            .await
            .unwrap();
        let run_id = store.create_run(workflow_id, None).await.unwrap();
        store
            .create_steps(
                run_id,
                &[NewStep {
                    step_id: "a".into(),
                    step_index: 0,
                    max_retries,
                }],
            )
            .await
            .unwrap();
        let run = store.get_run(run_id).await.unwrap();
        let step = store.get_steps_for_run(run_id).await.unwrap().remove(0);
        (run, step)
    }

    #[tokio::test]
    async fn retry_then_succeed() {
        let store = Arc::new(InMemoryStore::new());
        let (run, mut step) = seeded_run_and_step(&store, 3).await;
        let runner = Arc::new(ScriptedTaskRunner::new(vec![
            Err("boom".into()),
            Err("boom again".into()),
            Ok(()),
        ]));
        let executor = StepExecutor::new(
            store.clone(),
            runner.clone(),
            Arc::new(ActionRegistry::new()),
        );
        let cfg = config(3);

        let mut seen_keys = std::collections::HashSet::new();
        loop {
            let outcome = executor.execute_attempt(&run, &step, &cfg).await.unwrap();
            seen_keys.insert(store.get_step(step.id).await.unwrap().idempotency_key);
            match outcome {
                StepOutcome::Retry => {
                    step = store.get_step(step.id).await.unwrap();
                    continue;
                }
                StepOutcome::Completed => break,
                StepOutcome::Failed => panic!("should not fail"),
            }
        }

        let final_step = store.get_step(step.id).await.unwrap();
        assert_eq!(final_step.status, StepStatus::Completed);
        assert_eq!(final_step.retry_count, 2);
        assert_eq!(runner.invocation_count(), 3);
        // exactly one StepResult, under the final key
        let result = store
            .check_step_result(final_step.idempotency_key.unwrap())
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn retry_exhaustion_fails_step() {
        let store = Arc::new(InMemoryStore::new());
        let (run, step) = seeded_run_and_step(&store, 2).await;
        let runner = Arc::new(ScriptedTaskRunner::new(vec![
            Err("1".into()),
            Err("2".into()),
            Err("3".into()),
        ]));
        let executor = StepExecutor::new(
            store.clone(),
            runner.clone(),
            Arc::new(ActionRegistry::new()),
        );
        let cfg = config(2);

        let mut current = step;
        let outcome = loop {
            let outcome = executor.execute_attempt(&run, &current, &cfg).await.unwrap();
            if outcome == StepOutcome::Retry {
                current = store.get_step(current.id).await.unwrap();
                continue;
            }
            break outcome;
        };

        assert_eq!(outcome, StepOutcome::Failed);
        let final_step = store.get_step(current.id).await.unwrap();
        assert_eq!(final_step.status, StepStatus::Failed);
        assert_eq!(final_step.retry_count, 2);
        assert!(final_step.error_message.is_some());
        assert_eq!(runner.invocation_count(), 3);
    }

    #[tokio::test]
    async fn crash_recovery_skip_path_reuses_key_and_does_not_reinvoke() {
        let store = Arc::new(InMemoryStore::new());
        let (run, step) = seeded_run_and_step(&store, 0).await;

        // Simulate a step that was left `running` with a result already
        // committed under its key (S6 in the spec this engine implements).
        let key = Uuid::now_v7();
        let mut tx = store.begin().await.unwrap();
        tx.insert_step_result(key, step.id, None).await.unwrap();
        tx.update_step_status(
            step.id,
            StepStatus::Running,
            StepStatusUpdate {
                idempotency_key: Some(key),
                started_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let step = store.get_step(step.id).await.unwrap();
        let runner = Arc::new(ScriptedTaskRunner::new(vec![]));
        let executor = StepExecutor::new(
            store.clone(),
            runner.clone(),
            Arc::new(ActionRegistry::new()),
        );
        let outcome = executor
            .execute_attempt(&run, &step, &config(0))
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Completed);
        assert_eq!(runner.invocation_count(), 0, "task body must not re-run");
        let final_step = store.get_step(step.id).await.unwrap();
        assert_eq!(final_step.idempotency_key, Some(key));
    }

    /// An action-precondition failure must abort the whole success commit,
    /// not just the step's status write: no `StepResult` should survive
    /// under the key the failed attempt claimed.
    #[tokio::test]
    async fn action_precondition_failure_leaves_no_phantom_step_result() {
        let store = Arc::new(InMemoryStore::new());
        let workflow_id = store
            .create_workflow(
                "demo",
                serde_json::json!({"name": "demo", "steps": [{"id": "a", "type": "task", "config": {"action": "validate_order"}, "depends_on": []}]}),
            )
            .await
            .unwrap();
        let order_id = store.create_order(100.0).await.unwrap();

        // Move the order out of `pending` so `validate_order`'s
        // precondition check fails on this attempt.
        let mut tx = store.begin().await.unwrap();
        tx.update_order_status(order_id, OrderStatus::Validated)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let run_id = store.create_run(workflow_id, Some(order_id)).await.unwrap();
        store
            .create_steps(
                run_id,
                &[NewStep {
                    step_id: "a".into(),
                    step_index: 0,
                    max_retries: 0,
                }],
            )
            .await
            .unwrap();
        let run = store.get_run(run_id).await.unwrap();
        let step = store.get_steps_for_run(run_id).await.unwrap().remove(0);

        let runner = Arc::new(ScriptedTaskRunner::new(vec![Ok(())]));
        let executor = StepExecutor::new(
            store.clone(),
            runner,
            Arc::new(ActionRegistry::with_demo_actions()),
        );
        let cfg = StepConfig {
            action: "validate_order".to_string(),
            duration_seconds: 0.0,
            fail_probability: 0.0,
            max_retries: 0,
        };

        let outcome = executor.execute_attempt(&run, &step, &cfg).await.unwrap();
        assert_eq!(outcome, StepOutcome::Failed);

        let final_step = store.get_step(step.id).await.unwrap();
        assert_eq!(final_step.status, StepStatus::Failed);
        assert!(final_step
            .error_message
            .as_ref()
            .unwrap()
            .contains("precondition"));

        let key = final_step.idempotency_key.unwrap();
        assert!(
            store.check_step_result(key).await.unwrap().is_none(),
            "action-precondition failure must not leave a StepResult behind"
        );
    }
}
