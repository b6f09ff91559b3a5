#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use processor_core::config::ConsumerConfig;
use processor_core::{
    BrokerStream, HandlerError, HandlerOutput, NewTask, ProcessorError, ProcessorResult,
    StreamMessage, Task, TaskHandler, TaskQuery, TaskStatus, TaskStore, TaskType, TaskUpdate,
};
use processor_infrastructure::InMemoryBroker;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const STREAM: &str = "test:task_queue";
pub const GROUP: &str = "test_group";

pub fn consumer_config(max_retry_count: u32) -> ConsumerConfig {
    ConsumerConfig {
        stream_name: STREAM.to_string(),
        group_name: GROUP.to_string(),
        max_retry_count,
        block_time_ms: 50,
        backoff_unit_ms: 1_000,
        ..ConsumerConfig::default()
    }
}

/// 内存任务存储，记录写操作次数并可模拟读取故障
#[derive(Default)]
pub struct MockTaskStore {
    tasks: Mutex<HashMap<Uuid, Task>>,
    writes: AtomicUsize,
    fail_gets: AtomicBool,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub async fn insert_pending(&self, parameters: Value) -> Task {
        let task = self
            .create(&NewTask::pending(TaskType::Sleep, parameters))
            .await
            .unwrap();
        self.reset_writes();
        task
    }

    pub async fn force_status(&self, id: Uuid, update: TaskUpdate) {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id).unwrap();
        update.apply_to(task, Utc::now());
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn create(&self, task: &NewTask) -> ProcessorResult<Task> {
        let created = task.clone().into_task(Uuid::new_v4(), Utc::now());
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().await.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> ProcessorResult<Task> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(ProcessorError::Store("connection refused".to_string()));
        }
        self.tasks
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ProcessorError::task_not_found(id))
    }

    async fn update(&self, id: Uuid, update: &TaskUpdate) -> ProcessorResult<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| ProcessorError::task_not_found(id))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        update.apply_to(task, Utc::now());
        Ok(task.clone())
    }

    async fn update_if_status(
        &self,
        id: Uuid,
        expected: &[TaskStatus],
        update: &TaskUpdate,
    ) -> ProcessorResult<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| ProcessorError::task_not_found(id))?;
        if !expected.contains(&task.status) {
            return Ok(None);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        update.apply_to(task, Utc::now());
        Ok(Some(task.clone()))
    }

    async fn list(&self, query: &TaskQuery) -> ProcessorResult<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .filter(|t| {
                query
                    .statuses
                    .as_ref()
                    .map_or(true, |s| s.contains(&t.status))
            })
            .cloned()
            .collect())
    }

    async fn count(&self, statuses: Option<&[TaskStatus]>) -> ProcessorResult<i64> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .filter(|t| statuses.map_or(true, |s| s.contains(&t.status)))
            .count() as i64)
    }
}

/// 记录调用次数的处理器
pub struct RecordingHandler {
    calls: AtomicUsize,
    result: HandlerOutput,
}

impl RecordingHandler {
    pub fn succeeding(result: Option<Value>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            result: Ok(result),
        }
    }

    pub fn failing(error: HandlerError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            result: Err(error),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Sleep
    }

    async fn handle(&self, _task: &Task) -> HandlerOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// 在执行过程中取消自身任务的处理器，模拟取消与消费的竞争
pub struct CancelDuringRunHandler {
    pub store: Arc<MockTaskStore>,
}

#[async_trait]
impl TaskHandler for CancelDuringRunHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Sleep
    }

    async fn handle(&self, task: &Task) -> HandlerOutput {
        self.store
            .update_if_status(
                task.id,
                &TaskStatus::CANCELABLE,
                &TaskUpdate::canceled(Utc::now()),
            )
            .await
            .unwrap();
        Ok(Some(serde_json::json!({ "ignored": true })))
    }
}

/// 包装内存 broker，可按脚本让 claim/read 失败，并记录确认的消息
#[derive(Default)]
pub struct ScriptedBroker {
    pub inner: InMemoryBroker,
    fail_all: AtomicBool,
    claim_script: Mutex<VecDeque<bool>>,
    pub claim_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    acked: Mutex<Vec<String>>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_failing() -> Self {
        let broker = Self::default();
        broker.fail_all.store(true, Ordering::SeqCst);
        broker
    }

    /// `true` 表示对应的 claim 调用失败，脚本耗尽后全部成功
    pub async fn script_claims(&self, script: impl IntoIterator<Item = bool>) {
        self.claim_script.lock().await.extend(script);
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub async fn acked(&self) -> Vec<String> {
        self.acked.lock().await.clone()
    }

    fn failure() -> ProcessorError {
        ProcessorError::Broker("connection reset by peer".to_string())
    }
}

#[async_trait]
impl BrokerStream for ScriptedBroker {
    async fn ensure_group(&self, stream: &str, group: &str) -> ProcessorResult<()> {
        self.inner.ensure_group(stream, group).await
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self.claim_script.lock().await.pop_front().unwrap_or(false);
        if self.fail_all.load(Ordering::SeqCst) || scripted_failure {
            return Err(Self::failure());
        }
        self.inner
            .claim_stale(stream, group, consumer, min_idle, count)
            .await
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        self.inner
            .read_new(stream, group, consumer, block, count)
            .await
    }

    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> ProcessorResult<()> {
        self.acked.lock().await.push(message_id.to_string());
        self.inner.ack(stream, group, message_id).await
    }

    async fn publish(&self, stream: &str, fields: &[(String, String)]) -> ProcessorResult<String> {
        self.inner.publish(stream, fields).await
    }
}

/// 发布任务并以 `consumer` 身份读出对应消息
pub async fn deliver(broker: &ScriptedBroker, task_id: Uuid, consumer: &str) -> StreamMessage {
    broker.ensure_group(STREAM, GROUP).await.unwrap();
    broker
        .publish(STREAM, &StreamMessage::task_fields(task_id))
        .await
        .unwrap();
    let mut messages = broker
        .inner
        .read_new(STREAM, GROUP, consumer, Duration::ZERO, 1)
        .await
        .unwrap();
    messages.pop().unwrap()
}
