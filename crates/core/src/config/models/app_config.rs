use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    broker::BrokerConfig,
    consumer::ConsumerConfig,
    database::DatabaseConfig,
};

pub const ENV_PREFIX: &str = "PROCESSOR";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/processor.toml",
    "processor.toml",
    "/etc/task-processor/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub consumer: ConsumerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides, e.g. `PROCESSOR_CONSUMER__MAX_RETRY_COUNT=5`
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.broker.validate().context("消息队列配置验证失败")?;
        self.consumer.validate().context("消费者配置验证失败")?;
        if self.api.enabled {
            self.api.validate().context("API配置验证失败")?;
        }
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerType;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.consumer.stream_name, "Task_processing_system:task_queue");
        assert_eq!(config.consumer.group_name, "default_group");
        assert_eq!(config.consumer.max_retry_count, 3);
        assert_eq!(config.consumer.min_idle_time_ms, 10_000);
        assert_eq!(config.consumer.block_time_ms, 3_000);
        assert_eq!(config.consumer.batch_count, 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            url = "sqlite::memory:"

            [broker]
            type = "in_memory"

            [consumer]
            max_retry_count = 5
            "#,
        )
        .unwrap();

        assert!(config.database.is_sqlite());
        assert_eq!(config.broker.r#type, BrokerType::InMemory);
        assert_eq!(config.consumer.max_retry_count, 5);
        assert_eq!(config.consumer.block_time_ms, 3_000);
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.consumer.stream_name, config.consumer.stream_name);
    }

    #[test]
    fn test_invalid_database_url() {
        let result = AppConfig::from_toml(
            r#"
            [database]
            url = "mysql://localhost/db"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [database]
            url = "sqlite::memory:"

            [consumer]
            group_name = "reporting"
            batch_count = 4
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.consumer.group_name, "reporting");
        assert_eq!(config.consumer.batch_count, 4);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/processor.toml")).is_err());
    }
}
