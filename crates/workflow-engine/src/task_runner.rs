//! The Task Runner: invokes a step's opaque side-effecting task body.
//!
//! Stateless, holds no locks — `execute_attempt` in [`crate::step_executor`]
//! is the only caller, and it is safe to share one runner across every
//! run on the process (see the reference worker pool's stateless
//! activity-handler table, which this mirrors at a coarser grain).

use std::time::Duration;

use async_trait::async_trait;
use workflow_model::StepConfig;

use crate::action::ActionError;

/// A task body failed. Distinguishes a plain simulated/external failure
/// from one raised by an [`crate::action::ActionHandler`] precondition —
/// both consume the step's retry budget identically (see DESIGN.md).
#[derive(Debug, thiserror::Error)]
pub enum TaskExecutionError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("action precondition failed: {0}")]
    Action(#[from] ActionError),
}

/// Invokes a step's task body given its configuration.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, config: &StepConfig) -> Result<serde_json::Value, TaskExecutionError>;
}

/// Demo task runner: sleeps `duration_seconds` (always via `tokio::time::sleep`,
/// never a blocking sleep — a blocking call here would stall every other
/// run sharing the Tokio runtime) and fails with `fail_probability`.
///
/// Real deployments substitute an action-to-handler table keyed the same
/// way [`crate::action::ActionRegistry`] keys its demo-domain handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedTaskRunner;

#[async_trait]
impl TaskRunner for SimulatedTaskRunner {
    async fn run(&self, config: &StepConfig) -> Result<serde_json::Value, TaskExecutionError> {
        if config.duration_seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(config.duration_seconds)).await;
        }

        let roll: f64 = rand::random();
        if roll < config.fail_probability {
            return Err(TaskExecutionError::Failed(format!(
                "simulated failure for action '{}' (roll {roll:.4} < fail_probability {})",
                config.action, config.fail_probability
            )));
        }

        Ok(serde_json::json!({
            "action": config.action,
            "duration_seconds": config.duration_seconds,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(fail_probability: f64) -> StepConfig {
        StepConfig {
            action: "noop".to_string(),
            duration_seconds: 0.0,
            fail_probability,
            max_retries: 0,
        }
    }

    #[tokio::test]
    async fn never_fails_with_zero_probability() {
        let runner = SimulatedTaskRunner;
        for _ in 0..20 {
            assert!(runner.run(&config(0.0)).await.is_ok());
        }
    }

    #[tokio::test]
    async fn always_fails_with_full_probability() {
        let runner = SimulatedTaskRunner;
        for _ in 0..20 {
            assert!(runner.run(&config(1.0)).await.is_err());
        }
    }
}
