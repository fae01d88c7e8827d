//! HTTP API routes. Each submodule handles one resource with its own
//! `AppState`, mirroring the Step/Run/Workflow separation in the engine.

pub mod common;
pub mod orders;
pub mod runs;
pub mod workflows;

pub use common::{ErrorResponse, ListResponse};
