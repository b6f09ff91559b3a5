pub mod message;
pub mod query;
pub mod task;

pub use message::{StreamMessage, TASK_ID_FIELD};
pub use query::{parse_order_by, OrderBy, SortDirection, TaskColumn, TaskQuery, DEFAULT_ORDER_BY};
pub use task::{NewTask, Task, TaskStatus, TaskType, TaskUpdate};
