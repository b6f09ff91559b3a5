pub mod mapping;
pub mod migrations;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use processor_core::config::DatabaseConfig;
use processor_core::{ProcessorError, ProcessorResult, TaskStore};
use tracing::info;

pub use postgres::PostgresTaskStore;
pub use sqlite::SqliteTaskStore;

/// 按数据库 URL 选择存储实现
pub async fn create_task_store(config: &DatabaseConfig) -> ProcessorResult<Arc<dyn TaskStore>> {
    if config.is_sqlite() {
        let store = if config.url == "sqlite::memory:" {
            SqliteTaskStore::new_in_memory().await?
        } else {
            SqliteTaskStore::new_embedded(&config.url, config.max_connections).await?
        };
        info!("Using SQLite task store");
        return Ok(Arc::new(store));
    }

    if config.is_postgres() {
        let store = PostgresTaskStore::connect(config).await?;
        if config.run_migrations {
            store.run_migrations().await?;
        }
        info!("Using PostgreSQL task store");
        return Ok(Arc::new(store));
    }

    Err(ProcessorError::Configuration(format!(
        "Unsupported database url: {}",
        config.url
    )))
}
