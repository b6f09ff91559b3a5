pub mod database;
pub mod error_handling;
pub mod in_memory_broker;
pub mod redis_stream;

pub use database::{create_task_store, PostgresTaskStore, SqliteTaskStore};
pub use in_memory_broker::InMemoryBroker;
pub use redis_stream::{RedisStreamBroker, RedisStreamConfig};
