//! Row types for the five persisted relations (§3 of the spec this engine implements).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::status::{OrderStatus, RunStatus, StepStatus};

/// An immutable workflow definition, as stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    /// Opaque blob preserving the submitted shape byte-for-byte.
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Summary view that omits `definition` (list endpoints never leak it).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(w: &Workflow) -> Self {
        Self {
            id: w.id,
            name: w.name.clone(),
            created_at: w.created_at,
        }
    }
}

/// One execution instance of a [`Workflow`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub order_id: Option<Uuid>,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A [`Run`] joined with its workflow's name, as returned by list/detail
/// queries. `run`'s fields are flattened so the wire shape is flat
/// (`{id, workflow_id, workflow_name, order_id, status, ...}`), matching
/// the run-detail response shape rather than nesting under a `run` key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunWithWorkflowName {
    #[serde(flatten)]
    pub run: Run,
    pub workflow_name: String,
}

/// One instance of a workflow step within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: String,
    pub step_index: i32,
    pub status: StepStatus,
    pub idempotency_key: Option<Uuid>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Wire-safe projection of a [`Step`]: never leaks `run_id` or `idempotency_key`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepView {
    pub id: Uuid,
    pub step_id: String,
    pub step_index: i32,
    pub status: StepStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&Step> for StepView {
    fn from(s: &Step) -> Self {
        Self {
            id: s.id,
            step_id: s.step_id.clone(),
            step_index: s.step_index,
            status: s.status,
            retry_count: s.retry_count,
            max_retries: s.max_retries,
            started_at: s.started_at,
            completed_at: s.completed_at,
            error_message: s.error_message.clone(),
        }
    }
}

/// Durable record that a specific step attempt produced an outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub idempotency_key: Uuid,
    pub step_id: Uuid,
    pub result_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Demo domain entity: an order moving through `pending -> validated -> charged -> shipped`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields permitted in a run status update. Builder mirrors the reference
/// "variable-keyword update" pattern translated to a closed options record
/// (an unknown field is a compile error instead of a runtime one).
#[derive(Debug, Clone, Default)]
pub struct RunStatusUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunStatusUpdate {
    pub fn started_now() -> Self {
        Self {
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    pub fn completed_now() -> Self {
        Self {
            started_at: None,
            completed_at: Some(Utc::now()),
        }
    }
}

/// Fields permitted in a step status update.
#[derive(Debug, Clone, Default)]
pub struct StepStatusUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub idempotency_key: Option<Uuid>,
    pub retry_count: Option<i32>,
}
