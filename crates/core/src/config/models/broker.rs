use serde::{Deserialize, Serialize};

/// Broker type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrokerType {
    #[default]
    RedisStream,
    /// 进程内实现，只在 API 与 worker 同进程运行时有意义
    InMemory,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
    pub response_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 5,
            // XREADGROUP BLOCK 期间连接会挂起，响应超时需大于阻塞时长
            response_timeout_seconds: 30,
        }
    }
}

impl RedisConfig {
    /// Validate Redis configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Redis主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Redis端口必须大于0"));
        }

        if self.database < 0 {
            return Err(anyhow::anyhow!("Redis数据库索引不能为负数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }

        if self.response_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis响应超时时间必须大于0"));
        }

        Ok(())
    }
}

/// Broker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    #[serde(rename = "type")]
    pub r#type: BrokerType,
    pub redis: RedisConfig,
}

impl BrokerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.r#type {
            BrokerType::RedisStream => self.redis.validate(),
            BrokerType::InMemory => Ok(()),
        }
    }
}
