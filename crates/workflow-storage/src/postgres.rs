//! PostgreSQL-backed `WorkflowStore`, using a connection pool and one
//! transaction per call to [`WorkflowStore::begin`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;
use workflow_model::{
    Order, OrderStatus, Run, RunStatus, RunStatusUpdate, RunWithWorkflowName, Step, StepResult,
    StepStatus, StepStatusUpdate, Workflow, WorkflowSummary,
};

use crate::error::StoreError;
use crate::store::{NewStep, StoreTransaction, WorkflowStore};

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Apply this crate's migrations against `pool`. Call once at startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_workflow(row: &sqlx::postgres::PgRow) -> Workflow {
    Workflow {
        id: row.get("id"),
        name: row.get("name"),
        definition: row.get("definition"),
        created_at: row.get("created_at"),
    }
}

fn row_to_run(row: &sqlx::postgres::PgRow) -> Result<Run, StoreError> {
    let status: String = row.get("status");
    Ok(Run {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        order_id: row.get("order_id"),
        status: RunStatus::from_str(&status).map_err(|e| StoreError::Database(e.to_string()))?,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
    })
}

fn row_to_step(row: &sqlx::postgres::PgRow) -> Result<Step, StoreError> {
    let status: String = row.get("status");
    Ok(Step {
        id: row.get("id"),
        run_id: row.get("run_id"),
        step_id: row.get("step_id"),
        step_index: row.get("step_index"),
        status: StepStatus::from_str(&status).map_err(|e| StoreError::Database(e.to_string()))?,
        idempotency_key: row.get("idempotency_key"),
        retry_count: row.get("retry_count"),
        max_retries: row.get("max_retries"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    })
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order, StoreError> {
    let status: String = row.get("status");
    Ok(Order {
        id: row.get("id"),
        status: OrderStatus::from_str(&status).map_err(|e| StoreError::Database(e.to_string()))?,
        amount: row.get("amount"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl WorkflowStore for PostgresStore {
    #[instrument(skip(self, definition))]
    async fn create_workflow(
        &self,
        name: &str,
        definition: serde_json::Value,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO workflows (id, name, definition, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(name)
        .bind(&definition)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(%id, %name, "created workflow");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = sqlx::query("SELECT id, name, definition, created_at FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::WorkflowNotFound(id))?;
        Ok(row_to_workflow(&row))
    }

    #[instrument(skip(self))]
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, StoreError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM workflows ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|row| WorkflowSummary {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_run(
        &self,
        workflow_id: Uuid,
        order_id: Option<Uuid>,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO runs (id, workflow_id, order_id, status, started_at, completed_at, created_at) \
             VALUES ($1, $2, $3, 'pending', NULL, NULL, $4)",
        )
        .bind(id)
        .bind(workflow_id)
        .bind(order_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(%id, %workflow_id, "created run");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn list_runs(&self) -> Result<Vec<RunWithWorkflowName>, StoreError> {
        let rows = sqlx::query(
            "SELECT r.id, r.workflow_id, r.order_id, r.status, r.started_at, r.completed_at, \
                    r.created_at, w.name AS workflow_name \
             FROM runs r JOIN workflows w ON r.workflow_id = w.id \
             ORDER BY r.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(RunWithWorkflowName {
                    run: row_to_run(row)?,
                    workflow_name: row.get("workflow_name"),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        let row = sqlx::query(
            "SELECT id, workflow_id, order_id, status, started_at, completed_at, created_at \
             FROM runs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::RunNotFound(id))?;
        row_to_run(&row)
    }

    #[instrument(skip(self))]
    async fn list_running_runs(&self) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, order_id, status, started_at, completed_at, created_at \
             FROM runs WHERE status = 'running'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_run).collect()
    }

    #[instrument(skip(self, steps))]
    async fn create_steps(&self, run_id: Uuid, steps: &[NewStep]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let now = Utc::now();
        for s in steps {
            let id = Uuid::now_v7();
            sqlx::query(
                "INSERT INTO steps (id, run_id, step_id, step_index, status, idempotency_key, \
                                    retry_count, max_retries, started_at, completed_at, \
                                    error_message, created_at) \
                 VALUES ($1, $2, $3, $4, 'pending', NULL, 0, $5, NULL, NULL, NULL, $6)",
            )
            .bind(id)
            .bind(run_id)
            .bind(&s.step_id)
            .bind(s.step_index)
            .bind(s.max_retries)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        debug!(%run_id, count = steps.len(), "created steps");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_steps_for_run(&self, run_id: Uuid) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, run_id, step_id, step_index, status, idempotency_key, retry_count, \
                    max_retries, started_at, completed_at, error_message, created_at \
             FROM steps WHERE run_id = $1 ORDER BY step_index",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_step).collect()
    }

    #[instrument(skip(self))]
    async fn get_step(&self, id: Uuid) -> Result<Step, StoreError> {
        let row = sqlx::query(
            "SELECT id, run_id, step_id, step_index, status, idempotency_key, retry_count, \
                    max_retries, started_at, completed_at, error_message, created_at \
             FROM steps WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::StepNotFound(id))?;
        row_to_step(&row)
    }

    #[instrument(skip(self))]
    async fn check_step_result(
        &self,
        idempotency_key: Uuid,
    ) -> Result<Option<StepResult>, StoreError> {
        let row = sqlx::query(
            "SELECT idempotency_key, step_id, result_data, created_at \
             FROM step_results WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|row| StepResult {
            idempotency_key: row.get("idempotency_key"),
            step_id: row.get("step_id"),
            result_data: row.get("result_data"),
            created_at: row.get("created_at"),
        }))
    }

    #[instrument(skip(self))]
    async fn create_order(&self, amount: f64) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO orders (id, status, amount, created_at, updated_at) \
             VALUES ($1, 'pending', $2, $3, $3)",
        )
        .bind(id)
        .bind(amount)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError> {
        let row = sqlx::query(
            "SELECT id, status, amount, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::OrderNotFound(id))?;
        row_to_order(&row)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }
}

/// Wraps a `sqlx::Transaction<'static, Postgres>`. `tx` is `Option` so
/// `commit` can take ownership of the inner transaction through `&mut self`
/// (the `StoreTransaction` trait takes `self: Box<Self>` for `commit` but
/// `&mut self` for every write, which needs a live connection borrow).
struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn conn(&mut self) -> &mut Transaction<'static, Postgres> {
        self.tx.as_mut().expect("transaction already committed")
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn update_run_status(
        &mut self,
        id: Uuid,
        status: RunStatus,
        update: RunStatusUpdate,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE runs SET status = $2, \
                started_at = COALESCE($3, started_at), \
                completed_at = COALESCE($4, completed_at) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(update.started_at)
        .bind(update.completed_at)
        .execute(self.conn())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_step_status(
        &mut self,
        id: Uuid,
        status: StepStatus,
        update: StepStatusUpdate,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE steps SET status = $2, \
                started_at = COALESCE($3, started_at), \
                completed_at = COALESCE($4, completed_at), \
                error_message = COALESCE($5, error_message), \
                idempotency_key = COALESCE($6, idempotency_key), \
                retry_count = COALESCE($7, retry_count) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(update.error_message)
        .bind(update.idempotency_key)
        .bind(update.retry_count)
        .execute(self.conn())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_step_result(
        &mut self,
        idempotency_key: Uuid,
        step_id: Uuid,
        result_data: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO step_results (idempotency_key, step_id, result_data, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(idempotency_key)
        .bind(step_id)
        .bind(&result_data)
        .bind(Utc::now())
        .execute(self.conn())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateIdempotencyKey(idempotency_key))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn update_order_status(
        &mut self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .bind(Utc::now())
            .execute(self.conn())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let tx = self.tx.take().expect("transaction already committed");
        tx.commit().await.map_err(db_err)
    }
}
