//! The Recovery Coordinator — invoked once at process startup, before
//! accepting external requests (§4.6).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::error::EngineError;
use crate::run_executor::RunExecutor;
use workflow_storage::WorkflowStore;

pub struct RecoveryCoordinator {
    store: Arc<dyn WorkflowStore>,
    run_executor: Arc<RunExecutor>,
}

impl RecoveryCoordinator {
    pub fn new(store: Arc<dyn WorkflowStore>, run_executor: Arc<RunExecutor>) -> Self {
        Self { store, run_executor }
    }

    /// Find every run left `running` and resume each on its own worker.
    /// Returns the spawned handles, useful for test synchronization —
    /// production callers are free to ignore them and let workers
    /// outlive this call.
    pub async fn recover(&self) -> Result<Vec<JoinHandle<()>>, EngineError> {
        let running = self.store.list_running_runs().await?;
        info!(count = running.len(), "recovering interrupted runs");

        let mut handles = Vec::with_capacity(running.len());
        for run in running {
            let executor = Arc::clone(&self.run_executor);
            handles.push(tokio::spawn(async move {
                executor.run_to_completion(run.id).await;
            }));
        }
        Ok(handles)
    }
}
