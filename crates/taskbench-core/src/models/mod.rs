pub mod error;
pub mod task;

pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use task::{TASK_ARGS, TASK_COMMAND, TASK_ID_BYTES, Task, TaskAction, TaskId, TaskStatus};
