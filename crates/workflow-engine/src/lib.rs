//! The durable execution core: Task Runner, Step Executor, Run Executor,
//! Recovery Coordinator, and Action Dispatcher (§4.3–§4.7 of the spec
//! this crate implements).
//!
//! Everything here is storage-agnostic — it depends only on
//! [`workflow_storage::WorkflowStore`]'s transactional contract, never on
//! a concrete engine (Postgres or in-memory).

pub mod action;
pub mod error;
pub mod recovery;
pub mod run_executor;
pub mod step_executor;
pub mod task_runner;

pub use action::{ActionError, ActionHandler, ActionRegistry};
pub use error::EngineError;
pub use recovery::RecoveryCoordinator;
pub use run_executor::RunExecutor;
pub use step_executor::{StepExecutor, StepOutcome};
pub use task_runner::{SimulatedTaskRunner, TaskExecutionError, TaskRunner};
