pub mod broker;
pub mod handler;
pub mod task_store;

pub use broker::BrokerStream;
pub use handler::{HandlerOutput, TaskHandler};
pub use task_store::TaskStore;
