pub mod error;
pub mod task;

pub use error::{CoreError, CoreErrorKind};
pub use task::{TaskId, TaskRecord, TaskStatus, count_generating};
