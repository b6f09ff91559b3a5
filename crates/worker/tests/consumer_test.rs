mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{
    consumer_config, deliver, CancelDuringRunHandler, MockTaskStore, RecordingHandler,
    ScriptedBroker, GROUP, STREAM,
};
use processor_core::{
    BrokerStream, HandlerError, StreamMessage, TaskStatus, TaskStore, TaskUpdate,
};
use processor_worker::{ConsumerExit, HandlerRegistry, MessageOutcome, TaskConsumer};
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

fn consumer_with(
    store: Arc<MockTaskStore>,
    broker: Arc<ScriptedBroker>,
    registry: HandlerRegistry,
    max_retry_count: u32,
) -> TaskConsumer {
    TaskConsumer::builder(store, broker, registry)
        .config(consumer_config(max_retry_count))
        .consumer_name("consumer_a")
        .build()
}

fn registry_with(handler: Arc<RecordingHandler>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(handler);
    registry
}

#[tokio::test(start_paused = true)]
async fn test_sleep_task_completes() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let task = store.insert_pending(json!({ "seconds": 1 })).await;
    let message = deliver(&broker, task.id, "consumer_a").await;

    let consumer = consumer_with(
        store.clone(),
        broker.clone(),
        HandlerRegistry::with_builtin_handlers(),
        3,
    );
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Completed);
    let task = store.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result, Some(json!({ "slept_seconds": 1 })));
    assert!(task.started_at.is_some());
    assert!(task.ended_at.is_some());
    assert!(task.ended_at >= task.started_at);
    assert!(task.error_code.is_none());
    assert!(task.error_message.is_none());
    assert_eq!(broker.acked().await, vec![message.id.clone()]);
    assert_eq!(broker.inner.pending_count(STREAM, GROUP).await, 0);
}

#[tokio::test]
async fn test_canceled_task_is_skipped_and_acked() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let task = store.insert_pending(json!({})).await;
    store
        .force_status(task.id, TaskUpdate::canceled(Utc::now()))
        .await;
    let message = deliver(&broker, task.id, "consumer_a").await;

    let consumer = consumer_with(store.clone(), broker.clone(), registry_with(handler.clone()), 3);
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Skipped);
    assert_eq!(handler.calls(), 0);
    assert_eq!(store.writes(), 0);
    assert_eq!(store.get(task.id).await.unwrap().status, TaskStatus::Canceled);
    assert_eq!(broker.acked().await, vec![message.id.clone()]);
}

#[tokio::test]
async fn test_handler_error_marks_task_failed() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::failing(HandlerError::new("disk full")));
    let task = store.insert_pending(json!({})).await;
    let message = deliver(&broker, task.id, "consumer_a").await;

    let consumer = consumer_with(store.clone(), broker.clone(), registry_with(handler.clone()), 3);
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Failed);
    assert_eq!(handler.calls(), 1);
    let task = store.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("disk full"));
    assert_eq!(task.error_code, Some(1));
    assert!(task.result.is_none());
    assert!(task.ended_at.is_some());
    assert_eq!(broker.acked().await, vec![message.id.clone()]);
}

#[tokio::test]
async fn test_handler_error_code_is_recorded() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::failing(
        HandlerError::with_code("quota exceeded", 42),
    ));
    let task = store.insert_pending(json!({})).await;
    let message = deliver(&broker, task.id, "consumer_a").await;

    let consumer = consumer_with(store.clone(), broker.clone(), registry_with(handler), 3);
    consumer.process_message(&message).await;

    let task = store.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code, Some(42));
    assert_eq!(task.error_message.as_deref(), Some("quota exceeded"));
}

#[tokio::test]
async fn test_invalid_sleep_parameters_fail_the_task() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let task = store.insert_pending(json!({ "seconds": "soon" })).await;
    let message = deliver(&broker, task.id, "consumer_a").await;

    let consumer = consumer_with(
        store.clone(),
        broker.clone(),
        HandlerRegistry::with_builtin_handlers(),
        3,
    );
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Failed);
    let task = store.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code, Some(30001));
}

#[tokio::test]
async fn test_missing_handler_fails_task() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let task = store.insert_pending(json!({})).await;
    let message = deliver(&broker, task.id, "consumer_a").await;

    let consumer = consumer_with(store.clone(), broker.clone(), HandlerRegistry::new(), 3);
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Failed);
    let task = store.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code, Some(60001));
    assert!(task.started_at.is_some());
    assert_eq!(broker.acked().await, vec![message.id.clone()]);
}

#[tokio::test]
async fn test_store_failure_leaves_message_pending() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let task = store.insert_pending(json!({})).await;
    let message = deliver(&broker, task.id, "consumer_a").await;
    store.set_fail_gets(true);

    let consumer = consumer_with(store.clone(), broker.clone(), registry_with(handler.clone()), 3);
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Unacknowledged);
    assert_eq!(handler.calls(), 0);
    assert!(broker.acked().await.is_empty());
    assert_eq!(broker.inner.pending_count(STREAM, GROUP).await, 1);

    store.set_fail_gets(false);
    assert_eq!(store.get(task.id).await.unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_unknown_task_leaves_message_pending() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let message = deliver(&broker, Uuid::new_v4(), "consumer_a").await;

    let consumer = consumer_with(store.clone(), broker.clone(), registry_with(handler.clone()), 3);
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Unacknowledged);
    assert_eq!(handler.calls(), 0);
    assert!(broker.acked().await.is_empty());
}

#[tokio::test]
async fn test_message_without_task_id_is_dropped() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::succeeding(None));

    broker.ensure_group(STREAM, GROUP).await.unwrap();
    broker
        .publish(STREAM, &[("task_id".to_string(), "not-a-uuid".to_string())])
        .await
        .unwrap();
    let message = broker
        .inner
        .read_new(STREAM, GROUP, "consumer_a", Duration::ZERO, 1)
        .await
        .unwrap()
        .pop()
        .unwrap();

    let consumer = consumer_with(store.clone(), broker.clone(), registry_with(handler.clone()), 3);
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Skipped);
    assert_eq!(handler.calls(), 0);
    assert_eq!(broker.acked().await, vec![message.id.clone()]);

    let empty = StreamMessage::new("0-1", HashMap::new());
    assert_eq!(consumer.process_message(&empty).await, MessageOutcome::Skipped);
}

#[tokio::test]
async fn test_cancel_during_run_discards_result() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let task = store.insert_pending(json!({})).await;
    let message = deliver(&broker, task.id, "consumer_a").await;

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(CancelDuringRunHandler {
        store: store.clone(),
    }));
    let consumer = consumer_with(store.clone(), broker.clone(), registry, 3);
    let outcome = consumer.process_message(&message).await;

    assert_eq!(outcome, MessageOutcome::Skipped);
    let task = store.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Canceled);
    assert!(task.result.is_none());
    assert!(task.ended_at.is_some());
    assert_eq!(broker.acked().await, vec![message.id.clone()]);
}

#[tokio::test(start_paused = true)]
async fn test_stale_message_for_finished_task_is_reclaimed_and_acked() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let task = store.insert_pending(json!({})).await;

    // 另一个消费者取走消息后完成了任务，但在确认前崩溃
    let message = deliver(&broker, task.id, "crashed_consumer").await;
    store
        .force_status(
            task.id,
            TaskUpdate::completed(Some(json!({ "done": true })), Utc::now()),
        )
        .await;
    tokio::time::advance(Duration::from_secs(11)).await;

    let consumer = Arc::new(consumer_with(
        store.clone(),
        broker.clone(),
        registry_with(handler.clone()),
        3,
    ));
    let (tx, rx) = broadcast::channel(1);
    let running = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.run(rx).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).unwrap();
    assert_eq!(running.await.unwrap(), ConsumerExit::Stopped);

    assert_eq!(handler.calls(), 0);
    assert_eq!(store.writes(), 0);
    assert_eq!(broker.acked().await, vec![message.id.clone()]);
    assert_eq!(broker.inner.pending_count(STREAM, GROUP).await, 0);
    assert_eq!(store.get(task.id).await.unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_run_processes_published_task() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::succeeding(Some(json!({ "ok": true }))));
    let consumer = Arc::new(consumer_with(
        store.clone(),
        broker.clone(),
        registry_with(handler.clone()),
        3,
    ));

    let (tx, rx) = broadcast::channel(1);
    let running = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.run(rx).await })
    };

    // 等待消费者创建组后再发布
    tokio::time::sleep(Duration::from_millis(10)).await;
    let task = store.insert_pending(json!({})).await;
    broker
        .publish(STREAM, &StreamMessage::task_fields(task.id))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(()).unwrap();
    assert_eq!(running.await.unwrap(), ConsumerExit::Stopped);

    assert_eq!(handler.calls(), 1);
    let task = store.get(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result, Some(json!({ "ok": true })));
    assert_eq!(broker.acked().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_consumer_gives_up_after_max_retries() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::always_failing());
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let consumer = consumer_with(store, broker.clone(), registry_with(handler.clone()), 1);

    let (_tx, rx) = broadcast::channel(1);
    let started = tokio::time::Instant::now();
    let exit = consumer.run(rx).await;

    assert_eq!(exit, ConsumerExit::RetriesExhausted { failures: 2 });
    assert_eq!(broker.claim_calls(), 2);
    assert_eq!(broker.read_calls(), 0);
    assert_eq!(handler.calls(), 0);
    assert!(broker.acked().await.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_successful_fetch_resets_failure_count() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    broker.script_claims([true, false, true, true]).await;
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let consumer = consumer_with(store, broker.clone(), registry_with(handler), 1);

    let (_tx, rx) = broadcast::channel(1);
    let exit = consumer.run(rx).await;

    // 第二次成功后计数归零，因此第四次才超过上限
    assert_eq!(exit, ConsumerExit::RetriesExhausted { failures: 2 });
    assert_eq!(broker.claim_calls(), 4);
    assert_eq!(broker.read_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_idle_consumer() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let consumer = Arc::new(consumer_with(store, broker.clone(), registry_with(handler), 3));

    let (tx, rx) = broadcast::channel(1);
    let running = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.run(rx).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(()).unwrap();
    assert_eq!(running.await.unwrap(), ConsumerExit::Stopped);
    assert!(broker.read_calls() >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_backoff() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::always_failing());
    let handler = Arc::new(RecordingHandler::succeeding(None));
    let consumer = Arc::new(consumer_with(store, broker.clone(), registry_with(handler), 10));

    let (tx, rx) = broadcast::channel(1);
    let running = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.run(rx).await })
    };

    // 第 4 次失败后退避 15 秒，停止信号应在退避期间生效
    tokio::time::sleep(Duration::from_secs(12)).await;
    tx.send(()).unwrap();
    assert_eq!(running.await.unwrap(), ConsumerExit::Stopped);
    assert_eq!(broker.claim_calls(), 4);
}

#[tokio::test]
async fn test_shutdown_before_start() {
    let store = Arc::new(MockTaskStore::new());
    let broker = Arc::new(ScriptedBroker::new());
    let consumer = consumer_with(store, broker.clone(), HandlerRegistry::new(), 3);

    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();

    assert_eq!(consumer.run(rx).await, ConsumerExit::Stopped);
    assert_eq!(broker.claim_calls(), 0);
}

#[test]
fn test_default_consumer_name_uses_group_prefix() {
    let consumer = TaskConsumer::builder(
        Arc::new(MockTaskStore::new()),
        Arc::new(ScriptedBroker::new()),
        HandlerRegistry::new(),
    )
    .config(consumer_config(3))
    .build();

    assert!(consumer.consumer_name().starts_with("test_group_"));
    assert_eq!(consumer.retry_policy().max_retry_count, 3);
}
