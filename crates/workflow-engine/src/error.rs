//! Top-level error type for the Run/Step executors and Recovery Coordinator.

use uuid::Uuid;
use workflow_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("workflow {0} has a malformed stored definition: {1}")]
    InvalidDefinition(Uuid, String),

    #[error("run {run_id} references a step id '{step_id}' absent from its workflow's stored definition")]
    UnknownStep { run_id: Uuid, step_id: String },
}
