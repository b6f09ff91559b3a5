//! Row mapping shared by the PostgreSQL and SQLite stores

use processor_core::{ProcessorError, ProcessorResult, Task};
use sqlx::Row;
use uuid::Uuid;

/// Helper functions for parsing database fields across different database types
pub struct MappingHelpers;

impl MappingHelpers {
    pub fn row_to_task_postgres(row: &sqlx::postgres::PgRow) -> ProcessorResult<Task> {
        let task_type: String = row.try_get("type")?;
        let status: String = row.try_get("status")?;

        Ok(Task {
            id: row.try_get("id")?,
            task_type: task_type.parse()?,
            parameters: row.try_get("parameters")?,
            status: status.parse()?,
            result: row.try_get("result")?,
            error_code: row.try_get("error_code")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }

    /// SQLite 中 UUID 与 JSON 均以 TEXT 存储
    pub fn row_to_task_sqlite(row: &sqlx::sqlite::SqliteRow) -> ProcessorResult<Task> {
        let id: String = row.try_get("id")?;
        let task_type: String = row.try_get("type")?;
        let status: String = row.try_get("status")?;
        let parameters: String = row.try_get("parameters")?;
        let result: Option<String> = row.try_get("result")?;

        Ok(Task {
            id: Uuid::parse_str(&id)
                .map_err(|e| ProcessorError::Serialization(format!("解析任务ID失败: {e}")))?,
            task_type: task_type.parse()?,
            parameters: Self::parse_json(&parameters)?,
            status: status.parse()?,
            result: result.as_deref().map(Self::parse_json).transpose()?,
            error_code: row.try_get("error_code")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }

    fn parse_json(text: &str) -> ProcessorResult<serde_json::Value> {
        serde_json::from_str(text)
            .map_err(|e| ProcessorError::Serialization(format!("解析JSON字段失败: {e}")))
    }
}
