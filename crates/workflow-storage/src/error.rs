use uuid::Uuid;

/// Error type for store operations, mirroring the reference persistence
/// layer's `StoreError` taxonomy: not-found, uniqueness-violation, and
/// underlying-database variants.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("step not found: {0}")]
    StepNotFound(Uuid),

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("step result already recorded for idempotency key {0}")]
    DuplicateIdempotencyKey(Uuid),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
