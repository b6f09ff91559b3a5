use std::time::{Duration, Instant};

use processor_core::{ProcessorError, ProcessorResult};
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue, RedisResult};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::config::RedisStreamConfig;

/// 基于 `redis::aio::ConnectionManager` 的连接管理，断线后自动重连
pub struct RedisConnectionManager {
    manager: ConnectionManager,
    config: RedisStreamConfig,
}

impl RedisConnectionManager {
    pub async fn new(config: RedisStreamConfig) -> ProcessorResult<Self> {
        let client = Client::open(config.connection_info()).map_err(|e| {
            ProcessorError::Broker(format!("Failed to create Redis client: {e}"))
        })?;

        let manager = timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                ProcessorError::Broker(format!(
                    "Timed out connecting to Redis at {}:{} after {:?}",
                    config.host, config.port, config.connection_timeout
                ))
            })?
            .map_err(|e| {
                ProcessorError::Broker(format!(
                    "Failed to connect to Redis at {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        let manager = Self { manager, config };
        manager.ping().await?;
        debug!(
            "Successfully connected to Redis at {}:{}",
            manager.config.host, manager.config.port
        );

        Ok(manager)
    }

    /// 执行命令并返回原始的 Redis 结果，调用方可据此识别 BUSYGROUP 等错误码
    ///
    /// `extra_wait` 用于阻塞类命令，叠加在响应超时之上。
    pub async fn query<T: FromRedisValue>(
        &self,
        operation: &'static str,
        cmd: &redis::Cmd,
        extra_wait: Duration,
    ) -> ProcessorResult<RedisResult<T>> {
        let mut conn = self.manager.clone();
        let start = Instant::now();
        let budget = self.config.response_timeout + extra_wait;

        let result = match timeout(budget, cmd.query_async::<T>(&mut conn)).await {
            Ok(result) => result,
            Err(_) => {
                metrics::counter!("redis_stream_errors_total", "operation" => operation)
                    .increment(1);
                warn!("Redis {} timed out after {:?}", operation, budget);
                return Err(ProcessorError::Broker(format!(
                    "Redis {operation} timed out after {budget:?}"
                )));
            }
        };

        metrics::histogram!("redis_stream_operation_duration_seconds", "operation" => operation)
            .record(start.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::counter!("redis_stream_errors_total", "operation" => operation).increment(1);
        }

        Ok(result)
    }

    pub async fn execute_command<T: FromRedisValue>(
        &self,
        operation: &'static str,
        cmd: &redis::Cmd,
    ) -> ProcessorResult<T> {
        self.query(operation, cmd, Duration::ZERO)
            .await?
            .map_err(|e| ProcessorError::Broker(format!("Redis {operation} failed: {e}")))
    }

    pub async fn ping(&self) -> ProcessorResult<()> {
        let response: String = self.execute_command("ping", &redis::cmd("PING")).await?;
        if response == "PONG" {
            debug!("Redis connection test successful");
            Ok(())
        } else {
            let error_msg = format!("Unexpected PING response: {response}");
            error!("{}", error_msg);
            Err(ProcessorError::Broker(error_msg))
        }
    }

    pub async fn health_check(&self) -> bool {
        match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Redis health check failed: {}", e);
                false
            }
        }
    }
}
