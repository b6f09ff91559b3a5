use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use processor_core::config::DatabaseConfig;
use processor_core::{
    NewTask, ProcessorError, ProcessorResult, Task, TaskQuery, TaskStatus, TaskStore, TaskUpdate,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::database::mapping::MappingHelpers;
use crate::database::migrations::{POSTGRES_MIGRATIONS, TASK_COLUMNS};
use crate::error_handling::StoreOperation;
use crate::task_context;

pub struct PostgresTaskStore {
    pool: PgPool,
}

fn status_strings(statuses: &[TaskStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> ProcessorResult<Self> {
        debug!("Connecting to PostgreSQL task store");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| task_context!(StoreOperation::Read).database_error(e))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> ProcessorResult<()> {
        debug!("Running PostgreSQL database migrations");
        for statement in POSTGRES_MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| task_context!(StoreOperation::Migrate).database_error(e))?;
        }
        debug!("Successfully completed PostgreSQL database migrations");
        Ok(())
    }

    /// `expected` 为 `None` 时无条件更新
    async fn apply_update(
        &self,
        id: Uuid,
        expected: Option<&[TaskStatus]>,
        update: &TaskUpdate,
    ) -> ProcessorResult<Option<Task>> {
        let operation = if expected.is_some() {
            StoreOperation::ConditionalUpdate
        } else {
            StoreOperation::Update
        };
        let context = task_context!(operation, id);

        let mut sql = String::from(
            r#"
            UPDATE tasks SET
                status = COALESCE($2, status),
                result = COALESCE($3, result),
                error_code = COALESCE($4, error_code),
                error_message = COALESCE($5, error_message),
                started_at = COALESCE($6, started_at),
                ended_at = COALESCE($7, ended_at),
                updated_at = $8
            WHERE id = $1
            "#,
        );
        if expected.is_some() {
            sql.push_str(" AND status = ANY($9)");
        }
        sql.push_str(&format!(" RETURNING {TASK_COLUMNS}"));

        let mut query = sqlx::query(&sql)
            .bind(id)
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.result.clone())
            .bind(update.error_code)
            .bind(update.error_message.clone())
            .bind(update.started_at)
            .bind(update.ended_at)
            .bind(Utc::now());
        if let Some(expected) = expected {
            query = query.bind(status_strings(expected));
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        row.as_ref()
            .map(MappingHelpers::row_to_task_postgres)
            .transpose()
    }

    async fn exists(&self, id: Uuid) -> ProcessorResult<bool> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| task_context!(StoreOperation::Read, id).database_error(e))?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    #[instrument(skip(self, task), fields(task_type = %task.task_type))]
    async fn create(&self, task: &NewTask) -> ProcessorResult<Task> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let context = task_context!(StoreOperation::Create, id);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (id, type, parameters, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(task.task_type.as_str())
        .bind(&task.parameters)
        .bind(task.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        let created = MappingHelpers::row_to_task_postgres(&row)?;
        debug!(task_id = %created.id, "Task created");
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> ProcessorResult<Task> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| task_context!(StoreOperation::Read, id).database_error(e))?;

        match row {
            Some(row) => MappingHelpers::row_to_task_postgres(&row),
            None => Err(ProcessorError::task_not_found(id)),
        }
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: Uuid, update: &TaskUpdate) -> ProcessorResult<Task> {
        self.apply_update(id, None, update)
            .await?
            .ok_or_else(|| ProcessorError::task_not_found(id))
    }

    #[instrument(skip(self, update))]
    async fn update_if_status(
        &self,
        id: Uuid,
        expected: &[TaskStatus],
        update: &TaskUpdate,
    ) -> ProcessorResult<Option<Task>> {
        match self.apply_update(id, Some(expected), update).await? {
            Some(task) => Ok(Some(task)),
            None if self.exists(id).await? => Ok(None),
            None => Err(ProcessorError::task_not_found(id)),
        }
    }

    async fn list(&self, query: &TaskQuery) -> ProcessorResult<Vec<Task>> {
        let order_clause = query.order_clause()?;
        let filter = if query.statuses.is_some() {
            " WHERE status = ANY($3)"
        } else {
            ""
        };
        // LIMIT NULL 即不限制
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks{filter}{order_clause} LIMIT $1 OFFSET $2"
        );
        let limit = (query.limit > 0).then_some(query.limit as i64);

        let mut q = sqlx::query(&sql).bind(limit).bind(query.offset as i64);
        if let Some(statuses) = &query.statuses {
            q = q.bind(status_strings(statuses));
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| task_context!(StoreOperation::Query).database_error(e))?;

        rows.iter()
            .map(MappingHelpers::row_to_task_postgres)
            .collect()
    }

    async fn count(&self, statuses: Option<&[TaskStatus]>) -> ProcessorResult<i64> {
        let context = task_context!(StoreOperation::Count);
        let count: (i64,) = match statuses {
            Some(statuses) => {
                sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = ANY($1)")
                    .bind(status_strings(statuses))
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM tasks")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| context.database_error(e))?;
        Ok(count.0)
    }
}
