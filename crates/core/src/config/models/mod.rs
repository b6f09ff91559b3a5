pub mod api_observability;
pub mod app_config;
pub mod broker;
pub mod consumer;
pub mod database;

pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::AppConfig;
pub use broker::{BrokerConfig, BrokerType, RedisConfig};
pub use consumer::ConsumerConfig;
pub use database::DatabaseConfig;
