use thiserror::Error;

use crate::models::{TaskAction, TaskId};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    EntropyFailure,
    InvalidInput,
    StorageFailure,
    SerializationFailure,
    Cancelled,
    WorkerPanicked,
    Internal,
}

/// Every failure in the benchmark is terminal for the run it happens in.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub backend: Option<&'static str>,
    pub action: Option<TaskAction>,
    pub task_id: Option<TaskId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend: None,
            action: None,
            task_id: None,
            kind,
            message: message.into(),
        }
    }

    /// Failure of one backend action against one task.
    pub fn action_failed(
        backend: &'static str,
        action: TaskAction,
        task_id: &TaskId,
        kind: CoreErrorKind,
        detail: impl std::fmt::Display,
    ) -> Self {
        Self {
            backend: Some(backend),
            action: Some(action),
            task_id: Some(task_id.clone()),
            kind,
            message: format!("{backend} '{action}' for task '{task_id}' failed: {detail}"),
        }
    }
}
