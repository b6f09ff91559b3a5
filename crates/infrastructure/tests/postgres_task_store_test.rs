//! 需要 Docker，默认忽略：`cargo test -- --ignored`

use chrono::Utc;
use processor_core::config::DatabaseConfig;
use processor_core::{NewTask, TaskQuery, TaskStatus, TaskStore, TaskType, TaskUpdate};
use processor_infrastructure::PostgresTaskStore;
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

#[tokio::test]
#[ignore]
async fn test_postgres_task_lifecycle() {
    let container = Postgres::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();

    let config = DatabaseConfig {
        url: format!("postgres://postgres:postgres@{host}:{port}/postgres"),
        ..DatabaseConfig::default()
    };
    let store = PostgresTaskStore::connect(&config).await.unwrap();
    store.run_migrations().await.unwrap();
    store.run_migrations().await.unwrap();

    let task = store
        .create(&NewTask::pending(TaskType::Sleep, json!({ "seconds": 1 })))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let started = store
        .update_if_status(task.id, &[TaskStatus::Pending], &TaskUpdate::processing(Utc::now()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(started.status, TaskStatus::Processing);

    let again = store
        .update_if_status(task.id, &[TaskStatus::Pending], &TaskUpdate::processing(Utc::now()))
        .await
        .unwrap();
    assert!(again.is_none());

    let done = store
        .update_if_status(
            task.id,
            &[TaskStatus::Processing],
            &TaskUpdate::completed(Some(json!({ "slept": 1 })), Utc::now()),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.result, Some(json!({ "slept": 1 })));
    assert!(done.ended_at.is_some());

    let completed = TaskQuery::default().with_statuses(vec![TaskStatus::Completed]);
    assert_eq!(store.list(&completed).await.unwrap().len(), 1);
    assert_eq!(store.count(Some(&[TaskStatus::Completed])).await.unwrap(), 1);
    assert_eq!(store.count(None).await.unwrap(), 1);
}
