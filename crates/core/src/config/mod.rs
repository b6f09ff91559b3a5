pub mod models;

pub use models::{
    ApiConfig, AppConfig, BrokerConfig, BrokerType, ConsumerConfig, DatabaseConfig, LogFormat,
    ObservabilityConfig, RedisConfig,
};
