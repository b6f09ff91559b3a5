use std::time::Duration;

use processor_core::config::RedisConfig;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

/// Redis Stream 连接配置
#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout: Duration,
    /// 单条命令的响应超时，阻塞读取会在此基础上加上阻塞时长
    pub response_timeout: Duration,
}

impl Default for RedisStreamConfig {
    fn default() -> Self {
        Self::from(&RedisConfig::default())
    }
}

impl From<&RedisConfig> for RedisStreamConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            database: config.database,
            password: config.password.clone(),
            connection_timeout: Duration::from_secs(config.connection_timeout_seconds),
            response_timeout: Duration::from_secs(config.response_timeout_seconds),
        }
    }
}

impl RedisStreamConfig {
    /// 直接构造连接参数，密码中的 `@`、`:`、`/` 不需要转义
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.database,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    pub fn with_host_port(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }
}
