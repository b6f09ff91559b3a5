//! 任务消费者
//!
//! 单个消费者实例在一个循环内顺序处理消息：先认领空闲过久的待处理消息，
//! 没有时再阻塞读取新消息。横向扩展依靠同组内运行多个实例。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use processor_core::config::ConsumerConfig;
use processor_core::{
    BrokerStream, HandlerError, ProcessorResult, StreamMessage, TaskStatus, TaskStore, TaskUpdate,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::registry::HandlerRegistry;
use crate::retry::RetryPolicy;

/// 消费循环的退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// 收到停止信号
    Stopped,
    /// 连续 broker 故障次数超过上限
    RetriesExhausted { failures: u32 },
}

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Completed,
    Failed,
    /// 未执行处理器，消息已确认
    Skipped,
    /// 存储不可用或任务不存在，消息保留等待重新认领
    Unacknowledged,
}

impl MessageOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            MessageOutcome::Completed => "completed",
            MessageOutcome::Failed => "failed",
            MessageOutcome::Skipped => "skipped",
            MessageOutcome::Unacknowledged => "unacknowledged",
        }
    }
}

pub struct TaskConsumerBuilder {
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn BrokerStream>,
    registry: HandlerRegistry,
    config: ConsumerConfig,
    consumer_name: Option<String>,
}

impl TaskConsumerBuilder {
    pub fn config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// 覆盖自动生成的消费者名称，同组内必须唯一
    pub fn consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = Some(name.into());
        self
    }

    pub fn build(self) -> TaskConsumer {
        let consumer_name = self
            .consumer_name
            .unwrap_or_else(|| format!("{}_{}", self.config.group_name, Uuid::new_v4()));
        let retry = RetryPolicy::new(self.config.max_retry_count, self.config.backoff_unit());

        TaskConsumer {
            store: self.store,
            broker: self.broker,
            registry: self.registry,
            config: self.config,
            consumer_name,
            retry,
        }
    }
}

pub struct TaskConsumer {
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn BrokerStream>,
    registry: HandlerRegistry,
    config: ConsumerConfig,
    consumer_name: String,
    retry: RetryPolicy,
}

impl TaskConsumer {
    pub fn builder(
        store: Arc<dyn TaskStore>,
        broker: Arc<dyn BrokerStream>,
        registry: HandlerRegistry,
    ) -> TaskConsumerBuilder {
        TaskConsumerBuilder {
            store,
            broker,
            registry,
            config: ConsumerConfig::default(),
            consumer_name: None,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// 运行消费循环直到收到停止信号或 broker 故障超过重试上限
    ///
    /// 停止信号可以打断阻塞读取和退避等待，但不会打断正在执行的处理器。
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> ConsumerExit {
        info!(
            stream = %self.config.stream_name,
            group = %self.config.group_name,
            consumer = %self.consumer_name,
            "Task consumer started"
        );

        let mut failures: u32 = 0;
        let mut group_ready = false;

        loop {
            if !matches!(
                shutdown.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ) {
                return self.stopped();
            }

            let fetched = tokio::select! {
                _ = shutdown.recv() => return self.stopped(),
                fetched = self.fetch(&mut group_ready) => fetched,
            };

            match fetched {
                Ok(messages) => {
                    failures = 0;
                    for message in &messages {
                        self.process_message(message).await;
                    }
                }
                Err(e) => {
                    failures += 1;
                    group_ready = false;
                    metrics::counter!("task_consumer_broker_errors_total").increment(1);

                    if self.retry.is_exhausted(failures) {
                        error!(
                            consumer = %self.consumer_name,
                            failures,
                            "Broker failed {} consecutive times, giving up: {}",
                            failures,
                            e
                        );
                        return ConsumerExit::RetriesExhausted { failures };
                    }

                    let delay = self.retry.backoff(failures);
                    warn!(
                        consumer = %self.consumer_name,
                        failures,
                        "Broker error, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::select! {
                        _ = shutdown.recv() => return self.stopped(),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn stopped(&self) -> ConsumerExit {
        info!(consumer = %self.consumer_name, "Task consumer stopped");
        ConsumerExit::Stopped
    }

    /// 确保消费者组存在，然后优先认领空闲消息，没有时读取新消息
    async fn fetch(&self, group_ready: &mut bool) -> ProcessorResult<Vec<StreamMessage>> {
        let stream = &self.config.stream_name;
        let group = &self.config.group_name;

        if !*group_ready {
            self.broker.ensure_group(stream, group).await?;
            *group_ready = true;
        }

        let claimed = self
            .broker
            .claim_stale(
                stream,
                group,
                &self.consumer_name,
                self.config.min_idle_time(),
                self.config.batch_count,
            )
            .await?;
        if !claimed.is_empty() {
            metrics::counter!("task_consumer_messages_total", "source" => "stale")
                .increment(claimed.len() as u64);
            info!("Claimed {} stale messages", claimed.len());
            return Ok(claimed);
        }

        let fresh = self
            .broker
            .read_new(
                stream,
                group,
                &self.consumer_name,
                self.config.block_time(),
                self.config.batch_count,
            )
            .await?;
        if !fresh.is_empty() {
            metrics::counter!("task_consumer_messages_total", "source" => "new")
                .increment(fresh.len() as u64);
        }
        Ok(fresh)
    }

    /// 处理单条消息
    ///
    /// 1. 读取任务，失败则不确认
    /// 2. 非 PENDING 直接确认跳过
    /// 3. 条件更新为 PROCESSING，执行处理器，条件更新为 COMPLETED / FAILED
    /// 4. 最后确认消息
    pub async fn process_message(&self, message: &StreamMessage) -> MessageOutcome {
        let outcome = self.handle_message(message).await;
        metrics::counter!("task_consumer_tasks_total", "outcome" => outcome.as_label())
            .increment(1);
        outcome
    }

    async fn handle_message(&self, message: &StreamMessage) -> MessageOutcome {
        let task_id = match message.task_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(message_id = %message.id, "Dropping unprocessable message: {}", e);
                self.ack(message).await;
                return MessageOutcome::Skipped;
            }
        };

        let task = match self.store.get(task_id).await {
            Ok(task) => task,
            Err(e) if e.is_transient() => {
                metrics::counter!("task_consumer_store_errors_total", "class" => "transient")
                    .increment(1);
                error!(
                    message_id = %message.id,
                    task_id = %task_id,
                    "Task store unavailable, leaving message pending: {}",
                    e
                );
                return MessageOutcome::Unacknowledged;
            }
            Err(e) => {
                metrics::counter!("task_consumer_store_errors_total", "class" => "permanent")
                    .increment(1);
                warn!(
                    message_id = %message.id,
                    task_id = %task_id,
                    "Failed to fetch task, leaving message pending: {}",
                    e
                );
                return MessageOutcome::Unacknowledged;
            }
        };

        if !task.is_pending() {
            debug!(
                task_id = %task_id,
                status = %task.status,
                "Task is not pending, skipping"
            );
            self.ack(message).await;
            return MessageOutcome::Skipped;
        }

        let handler = self.registry.resolve(task.task_type);

        let started = match self
            .store
            .update_if_status(
                task_id,
                &[TaskStatus::Pending],
                &TaskUpdate::processing(Utc::now()),
            )
            .await
        {
            Ok(Some(task)) => task,
            Ok(None) => {
                info!(task_id = %task_id, "Task left PENDING before processing started, skipping");
                self.ack(message).await;
                return MessageOutcome::Skipped;
            }
            Err(e) => {
                error!(task_id = %task_id, "Failed to mark task as processing: {}", e);
                return MessageOutcome::Unacknowledged;
            }
        };

        info!(
            task_id = %task_id,
            task_type = %started.task_type,
            "Processing task"
        );
        let start = Instant::now();
        let output = match handler {
            Ok(handler) => handler.handle(&started).await,
            Err(e) => Err(HandlerError::from(e)),
        };
        metrics::histogram!("task_handler_duration_seconds", "task_type" => started.task_type.as_str())
            .record(start.elapsed().as_secs_f64());

        let (update, outcome) = match output {
            Ok(result) => (
                TaskUpdate::completed(result, Utc::now()),
                MessageOutcome::Completed,
            ),
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    error_code = e.code(),
                    "Task failed: {}",
                    e
                );
                (TaskUpdate::failed(&e, Utc::now()), MessageOutcome::Failed)
            }
        };

        let outcome = match self
            .store
            .update_if_status(task_id, &[TaskStatus::Processing], &update)
            .await
        {
            Ok(Some(_)) => {
                info!(
                    task_id = %task_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Task finished: {}",
                    outcome.as_label()
                );
                outcome
            }
            Ok(None) => {
                info!(task_id = %task_id, "Task was canceled while running, result discarded");
                MessageOutcome::Skipped
            }
            Err(e) => {
                error!(task_id = %task_id, "Failed to record task result: {}", e);
                return MessageOutcome::Unacknowledged;
            }
        };

        self.ack(message).await;
        outcome
    }

    /// 确认失败只记录日志，消息会在空闲超时后被重新认领并跳过
    async fn ack(&self, message: &StreamMessage) {
        if let Err(e) = self
            .broker
            .ack(
                &self.config.stream_name,
                &self.config.group_name,
                &message.id,
            )
            .await
        {
            warn!(message_id = %message.id, "Failed to acknowledge message: {}", e);
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}
