pub mod config;
pub mod error_codes;
pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod traits;

pub use config::AppConfig;
pub use error_codes::{validate_error_codes, ErrorKind, ERROR_CODES};
pub use errors::{ErrorDetail, HandlerError, ProcessorError, ProcessorResult};
pub use logging::init_logging;
pub use models::{NewTask, StreamMessage, Task, TaskQuery, TaskStatus, TaskType, TaskUpdate};
pub use services::TaskService;
pub use traits::{BrokerStream, HandlerOutput, TaskHandler, TaskStore};
