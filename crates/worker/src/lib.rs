pub mod consumer;
pub mod handlers;
pub mod registry;
pub mod retry;

pub use consumer::{ConsumerExit, MessageOutcome, TaskConsumer, TaskConsumerBuilder};
pub use handlers::SleepHandler;
pub use registry::HandlerRegistry;
pub use retry::RetryPolicy;
