use crate::models::{CoreResult, Task, TaskAction, TaskStatus};
use crate::persistence::TaskBackend;

pub const OUTPUT_UPDATES: usize = 10;
pub const OUTPUT_PAYLOAD: &str = "Some kind of output and whatever";
/// create + status + output updates + delete
pub const ACTIONS_PER_LIFECYCLE: usize = OUTPUT_UPDATES + 3;

/// The ordered actions one lifecycle issues against its backend.
pub fn lifecycle_actions() -> Vec<TaskAction> {
    let mut actions = Vec::with_capacity(ACTIONS_PER_LIFECYCLE);
    actions.push(TaskAction::Create);
    actions.push(TaskAction::Status);
    actions.extend(std::iter::repeat_n(TaskAction::Output, OUTPUT_UPDATES));
    actions.push(TaskAction::Delete);
    actions
}

pub fn output_for(iteration: usize) -> String {
    format!("{iteration}{OUTPUT_PAYLOAD}")
}

/// Drives one freshly generated task through its whole lifecycle.
///
/// Each backend call completes before the next one is issued; the first
/// failure ends the lifecycle and is returned as is.
pub fn simulate(backend: &dyn TaskBackend) -> CoreResult<Task> {
    let mut task = Task::generate()?;

    backend.apply(TaskAction::Create, &task)?;

    task.status = TaskStatus::Processing;
    backend.apply(TaskAction::Status, &task)?;

    for iteration in 0..OUTPUT_UPDATES {
        task.output = output_for(iteration);
        backend.apply(TaskAction::Output, &task)?;
    }

    backend.apply(TaskAction::Delete, &task)?;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::{ACTIONS_PER_LIFECYCLE, lifecycle_actions, simulate};
    use crate::models::{CoreError, CoreErrorKind, Task, TaskAction, TaskStatus};
    use crate::persistence::{PersistenceResult, TaskBackend};

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(TaskAction, Task)>>,
        fail_on: Option<TaskAction>,
    }

    impl TaskBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn apply(&self, action: TaskAction, task: &Task) -> PersistenceResult<()> {
            self.calls.lock().unwrap().push((action, task.clone()));
            if self.fail_on == Some(action) {
                return Err(CoreError::action_failed(
                    "recording",
                    action,
                    &task.id,
                    CoreErrorKind::StorageFailure,
                    "injected",
                ));
            }
            Ok(())
        }
    }

    #[test]
    fn lifecycle_issues_actions_in_fixed_order() {
        let backend = RecordingBackend::default();
        simulate(&backend).unwrap();

        let calls = backend.calls.lock().unwrap();
        let actions: Vec<TaskAction> = calls.iter().map(|(action, _)| *action).collect();
        assert_eq!(actions, lifecycle_actions());
        assert_eq!(actions.len(), ACTIONS_PER_LIFECYCLE);
    }

    #[test]
    fn task_id_is_stable_and_state_advances_between_calls() {
        let backend = RecordingBackend::default();
        let finished = simulate(&backend).unwrap();

        let calls = backend.calls.lock().unwrap();
        assert!(calls.iter().all(|(_, task)| task.id == finished.id));
        assert_eq!(calls[0].1.status, TaskStatus::Pending);
        assert!(calls[0].1.output.is_empty());
        assert_eq!(calls[1].1.status, TaskStatus::Processing);
        assert_eq!(calls[2].1.output, "0Some kind of output and whatever");
        assert_eq!(calls[11].1.output, "9Some kind of output and whatever");
        assert_eq!(calls[12].1.output, finished.output);
    }

    #[test]
    fn first_failure_stops_the_lifecycle() {
        let backend = RecordingBackend {
            fail_on: Some(TaskAction::Status),
            ..RecordingBackend::default()
        };
        let error = simulate(&backend).unwrap_err();

        assert_eq!(error.action, Some(TaskAction::Status));
        assert_eq!(backend.calls.lock().unwrap().len(), 2);
    }
}
