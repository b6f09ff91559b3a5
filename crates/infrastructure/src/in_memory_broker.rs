use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use processor_core::{BrokerStream, ProcessorError, ProcessorResult, StreamMessage};
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// 内存消息流实现
///
/// 语义与 Redis Streams 消费者组一致：每个组维护自己的投递位置和待处理列表（PEL），
/// 未确认的消息空闲超过阈值后可被同组其他消费者认领。所有组都已投递并确认的条目会被移除。
/// 时间基于 `tokio::time`，测试中可通过 `tokio::time::pause` 推进。
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    streams: Mutex<HashMap<String, StreamState>>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: BTreeMap<u64, Entry>,
    /// 消息 ID 到序号
    index: HashMap<String, u64>,
    next_seq: u64,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    fields: HashMap<String, String>,
}

#[derive(Debug)]
struct GroupState {
    /// 已投递的最大序号
    last_delivered: u64,
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

impl StreamState {
    fn entry(&self, seq: u64) -> Option<&Entry> {
        self.entries.get(&seq)
    }

    /// 移除所有组都已投递且确认的条目
    fn trim(&mut self) {
        let Some(watermark) = self
            .groups
            .values()
            .map(|g| match g.pending.keys().next() {
                Some(&first) => g.last_delivered.min(first - 1),
                None => g.last_delivered,
            })
            .min()
        else {
            return;
        };

        let retained = self.entries.split_off(&(watermark + 1));
        for entry in std::mem::replace(&mut self.entries, retained).into_values() {
            self.index.remove(&entry.id);
        }
    }

    fn group_mut(&mut self, stream: &str, group: &str) -> ProcessorResult<&mut GroupState> {
        self.groups.get_mut(group).ok_or_else(|| no_group(stream, group))
    }
}

fn no_group(stream: &str, group: &str) -> ProcessorError {
    ProcessorError::Broker(format!(
        "NOGROUP No such key '{stream}' or consumer group '{group}'"
    ))
}

fn to_message(entry: &Entry) -> StreamMessage {
    StreamMessage::new(entry.id.clone(), entry.fields.clone())
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试投递新消息，没有新消息时返回空
    async fn deliver_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;

        let last_delivered = state.group_mut(stream, group)?.last_delivered;
        let fresh: Vec<(u64, StreamMessage)> = state
            .entries
            .range(last_delivered + 1..)
            .take(count)
            .map(|(seq, entry)| (*seq, to_message(entry)))
            .collect();

        let now = Instant::now();
        let group_state = state.group_mut(stream, group)?;
        for (seq, _) in &fresh {
            group_state.last_delivered = *seq;
            group_state.pending.insert(
                *seq,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
        }

        Ok(fresh.into_iter().map(|(_, message)| message).collect())
    }

    /// 组内待处理（已投递未确认）的消息数
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        let streams = self.streams.lock().await;
        streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    /// 某条消息被投递的次数，未在待处理列表中时返回 `None`
    pub async fn delivery_count(&self, stream: &str, group: &str, message_id: &str) -> Option<u64> {
        let streams = self.streams.lock().await;
        let state = streams.get(stream)?;
        let seq = state.index.get(message_id)?;
        state
            .groups
            .get(group)?
            .pending
            .get(seq)
            .map(|p| p.delivery_count)
    }

    /// 流中尚未被移除的条目数
    pub async fn stream_len(&self, stream: &str) -> usize {
        let streams = self.streams.lock().await;
        streams.get(stream).map(|s| s.entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BrokerStream for InMemoryBroker {
    async fn ensure_group(&self, stream: &str, group: &str) -> ProcessorResult<()> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(stream.to_string()).or_default();
        let last_seq = state.next_seq;
        if !state.groups.contains_key(group) {
            state.groups.insert(
                group.to_string(),
                GroupState {
                    last_delivered: last_seq,
                    pending: BTreeMap::new(),
                },
            );
            state.trim();
        }
        Ok(())
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let now = Instant::now();

        let stale: Vec<u64> = state
            .group_mut(stream, group)?
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.delivered_at) >= min_idle)
            .map(|(seq, _)| *seq)
            .take(count)
            .collect();

        let mut claimed = Vec::with_capacity(stale.len());
        for seq in stale {
            let Some(message) = state.entry(seq).map(to_message) else {
                continue;
            };
            if let Some(pending) = state.group_mut(stream, group)?.pending.get_mut(&seq) {
                debug!(
                    "Message {} claimed by {} from {}",
                    message.id, consumer, pending.consumer
                );
                pending.consumer = consumer.to_string();
                pending.delivered_at = now;
                pending.delivery_count += 1;
            }
            claimed.push(message);
        }

        Ok(claimed)
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> ProcessorResult<Vec<StreamMessage>> {
        let deadline = Instant::now() + block;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let messages = self.deliver_new(stream, group, consumer, count).await?;
            if !messages.is_empty() || block.is_zero() {
                return Ok(messages);
            }

            if timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, message_id: &str) -> ProcessorResult<()> {
        let mut streams = self.streams.lock().await;
        let Some(state) = streams.get_mut(stream) else {
            return Ok(());
        };
        let Some(&seq) = state.index.get(message_id) else {
            return Ok(());
        };
        let removed = state
            .groups
            .get_mut(group)
            .is_some_and(|g| g.pending.remove(&seq).is_some());
        if removed {
            state.trim();
        }
        Ok(())
    }

    async fn publish(&self, stream: &str, fields: &[(String, String)]) -> ProcessorResult<String> {
        let id = {
            let mut streams = self.streams.lock().await;
            let state = streams.entry(stream.to_string()).or_default();
            state.next_seq += 1;
            let seq = state.next_seq;
            let id = format!("{}-{}", chrono::Utc::now().timestamp_millis(), seq);
            state.index.insert(id.clone(), seq);
            state.entries.insert(
                seq,
                Entry {
                    id: id.clone(),
                    fields: fields.iter().cloned().collect(),
                },
            );
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }
}
