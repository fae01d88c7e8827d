//! Shared domain types for the durable workflow engine.
//!
//! This crate is deliberately I/O-free: [`workflow-storage`] persists
//! these types, [`workflow-engine`] operates on them, and
//! [`workflow-api`] serializes the subset that is safe to expose over
//! the wire (see [`entities::StepView`] and [`entities::WorkflowSummary`]).

pub mod definition;
pub mod entities;
pub mod status;
pub mod topo;

pub use definition::{StepConfig, StepDefinition, WorkflowDefinition};
pub use entities::{
    Order, Run, RunStatusUpdate, RunWithWorkflowName, Step, StepResult, StepStatusUpdate,
    StepView, Workflow, WorkflowSummary,
};
pub use status::{OrderStatus, RunStatus, StepStatus, UnknownStatus};
pub use topo::{topological_sort, TopoError};
