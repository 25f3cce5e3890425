use crate::models::{CoreResult, Task, TaskAction};

pub type PersistenceResult<T> = CoreResult<T>;

/// A durable sink for task lifecycle events.
///
/// One instance is shared by every worker of a run, so implementations must
/// tolerate concurrent calls for distinct task ids.
pub trait TaskBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, action: TaskAction, task: &Task) -> PersistenceResult<()>;
}

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}
