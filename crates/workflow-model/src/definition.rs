//! Wire format for workflow definitions.
//!
//! These types mirror the JSON shape clients submit. The engine treats
//! the definition as an opaque blob once persisted (see [`crate::workflow::Workflow`]);
//! these structs exist so the API and validator crates have a typed view
//! of that blob without needing to know how the engine stores it.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_duration_seconds() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    0
}

/// Configuration for a single step's task body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StepConfig {
    pub action: String,

    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: f64,

    #[serde(default)]
    pub fail_probability: f64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// A single step in a workflow definition, as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StepDefinition {
    pub id: String,

    #[serde(rename = "type")]
    pub step_type: String,

    pub config: StepConfig,

    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A complete workflow definition as submitted to `create_workflow`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Parse a definition out of the opaque blob the store persists.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Serialize to the opaque blob the store persists.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Look up a step's config by its definition-level id.
    pub fn step_config(&self, step_id: &str) -> Option<&StepConfig> {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .map(|s| &s.config)
    }
}
