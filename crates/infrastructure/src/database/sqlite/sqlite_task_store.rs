use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use processor_core::{
    NewTask, ProcessorError, ProcessorResult, Task, TaskQuery, TaskStatus, TaskStore, TaskUpdate,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::database::mapping::MappingHelpers;
use crate::database::migrations::{SQLITE_MIGRATIONS, TASK_COLUMNS};
use crate::error_handling::StoreOperation;
use crate::task_context;

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

/// 生成 `status IN (?, ?)`，空集合时生成恒假条件
fn status_filter(statuses: &[TaskStatus]) -> String {
    if statuses.is_empty() {
        return "0 = 1".to_string();
    }
    let placeholders = vec!["?"; statuses.len()].join(", ");
    format!("status IN ({placeholders})")
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建嵌入式SQLite任务存储，自动初始化数据库
    pub async fn new_embedded(database_url: &str, max_connections: u32) -> ProcessorResult<Self> {
        debug!("Creating embedded SQLite task store at: {}", database_url);

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| task_context!(StoreOperation::Migrate).database_error(e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .min_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| task_context!(StoreOperation::Migrate).database_error(e))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// 内存数据库，仅有一个永不过期的连接，关闭后数据丢失
    pub async fn new_in_memory() -> ProcessorResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| task_context!(StoreOperation::Migrate).database_error(e))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn run_migrations(&self) -> ProcessorResult<()> {
        debug!("Running SQLite database migrations");
        for statement in SQLITE_MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| task_context!(StoreOperation::Migrate).database_error(e))?;
        }
        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

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

        let result_json = update
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| context.serialization_error(e))?;

        let mut sql = String::from(
            r#"
            UPDATE tasks SET
                status = COALESCE(?, status),
                result = COALESCE(?, result),
                error_code = COALESCE(?, error_code),
                error_message = COALESCE(?, error_message),
                started_at = COALESCE(?, started_at),
                ended_at = COALESCE(?, ended_at),
                updated_at = ?
            WHERE id = ?
            "#,
        );
        if let Some(expected) = expected {
            sql.push_str(&format!(" AND {}", status_filter(expected)));
        }
        sql.push_str(&format!(" RETURNING {TASK_COLUMNS}"));

        let mut query = sqlx::query(&sql)
            .bind(update.status.map(|s| s.as_str()))
            .bind(result_json)
            .bind(update.error_code)
            .bind(update.error_message.clone())
            .bind(update.started_at)
            .bind(update.ended_at)
            .bind(Utc::now())
            .bind(id.to_string());
        for status in expected.unwrap_or_default() {
            query = query.bind(status.as_str());
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| context.database_error(e))?;

        row.as_ref()
            .map(MappingHelpers::row_to_task_sqlite)
            .transpose()
    }

    async fn exists(&self, id: Uuid) -> ProcessorResult<bool> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| task_context!(StoreOperation::Read, id).database_error(e))?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self, task), fields(task_type = %task.task_type))]
    async fn create(&self, task: &NewTask) -> ProcessorResult<Task> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let context = task_context!(StoreOperation::Create, id);

        let parameters_json =
            serde_json::to_string(&task.parameters).map_err(|e| context.serialization_error(e))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (id, type, parameters, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.to_string())
        .bind(task.task_type.as_str())
        .bind(parameters_json)
        .bind(task.status.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| context.database_error(e))?;

        let created = MappingHelpers::row_to_task_sqlite(&row)?;
        debug!(task_id = %created.id, "Task created");
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> ProcessorResult<Task> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| task_context!(StoreOperation::Read, id).database_error(e))?;

        match row {
            Some(row) => MappingHelpers::row_to_task_sqlite(&row),
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
        let filter = query
            .statuses
            .as_deref()
            .map(|s| format!(" WHERE {}", status_filter(s)))
            .unwrap_or_default();
        // SQLite 中 LIMIT -1 表示不限制
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks{filter}{order_clause} LIMIT ? OFFSET ?");
        let limit = if query.limit > 0 { query.limit as i64 } else { -1 };

        let mut q = sqlx::query(&sql);
        for status in query.statuses.as_deref().unwrap_or_default() {
            q = q.bind(status.as_str());
        }
        q = q.bind(limit).bind(query.offset as i64);

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| task_context!(StoreOperation::Query).database_error(e))?;

        rows.iter().map(MappingHelpers::row_to_task_sqlite).collect()
    }

    async fn count(&self, statuses: Option<&[TaskStatus]>) -> ProcessorResult<i64> {
        let filter = statuses
            .map(|s| format!(" WHERE {}", status_filter(s)))
            .unwrap_or_default();
        let sql = format!("SELECT COUNT(*) FROM tasks{filter}");

        let mut q = sqlx::query_as::<sqlx::Sqlite, (i64,)>(&sql);
        for status in statuses.unwrap_or_default() {
            q = q.bind(status.as_str());
        }

        let count = q
            .fetch_one(&self.pool)
            .await
            .map_err(|e| task_context!(StoreOperation::Count).database_error(e))?;
        Ok(count.0)
    }
}
