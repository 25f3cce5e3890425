use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::models::{CoreError, CoreErrorKind, Task, TaskAction, TaskId};
use crate::persistence::{PersistenceResult, TaskBackend};

const BACKEND_NAME: &str = "file";
const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

/// One JSON document per task id inside a single directory.
///
/// Writes go to a hidden sibling temp file which is then renamed over the
/// record path, so readers only ever see a complete document.
#[derive(Clone, Debug)]
pub struct FileTaskStore {
    directory: PathBuf,
}

/// A fully written temp file that has not been renamed into place yet.
#[derive(Debug)]
pub struct StagedRecord {
    temp_path: PathBuf,
    record_path: PathBuf,
}

impl StagedRecord {
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn publish(self) -> std::io::Result<()> {
        fs::rename(&self.temp_path, &self.record_path)
    }

    pub fn discard(self) -> std::io::Result<()> {
        fs::remove_file(&self.temp_path)
    }
}

impl FileTaskStore {
    pub fn open(directory: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|error| {
            let mut core = CoreError::new(
                CoreErrorKind::StorageFailure,
                format!(
                    "file store could not create directory '{}': {error}",
                    directory.display()
                ),
            );
            core.backend = Some(BACKEND_NAME);
            core
        })?;
        tracing::info!(directory = %directory.display(), "opened file task store");
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn record_path(&self, task_id: &TaskId) -> PathBuf {
        self.directory.join(task_id.as_str())
    }

    fn temp_path(&self, task_id: &TaskId) -> PathBuf {
        self.directory
            .join(format!("{TEMP_PREFIX}{}{TEMP_SUFFIX}", task_id.as_str()))
    }

    /// Serializes `task` into its temp file without touching the record path.
    pub fn stage(&self, action: TaskAction, task: &Task) -> PersistenceResult<StagedRecord> {
        let document = serde_json::to_vec(task).map_err(|error| {
            CoreError::action_failed(
                BACKEND_NAME,
                action,
                &task.id,
                CoreErrorKind::SerializationFailure,
                error,
            )
        })?;

        let staged = StagedRecord {
            temp_path: self.temp_path(&task.id),
            record_path: self.record_path(&task.id),
        };
        write_file(&staged.temp_path, &document).map_err(|error| {
            CoreError::action_failed(
                BACKEND_NAME,
                action,
                &task.id,
                CoreErrorKind::StorageFailure,
                format!("writing '{}': {error}", staged.temp_path.display()),
            )
        })?;
        Ok(staged)
    }

    pub fn load_task(&self, task_id: &TaskId) -> PersistenceResult<Option<Task>> {
        let path = self.record_path(task_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(storage_error(format!(
                    "reading '{}': {error}",
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|error| {
            let mut core = storage_error(format!("decoding '{}': {error}", path.display()));
            core.kind = CoreErrorKind::SerializationFailure;
            core.task_id = Some(task_id.clone());
            core
        })
    }

    /// Number of published records; in-flight temp files are not counted.
    pub fn record_count(&self) -> PersistenceResult<usize> {
        let mut count = 0;
        for entry in self.read_dir()? {
            if !is_temp_name(&entry.file_name().to_string_lossy()) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Removes every record and temp file in the directory.
    pub fn clear(&self) -> PersistenceResult<usize> {
        let mut removed = 0;
        for entry in self.read_dir()? {
            let path = entry.path();
            fs::remove_file(&path).map_err(|error| {
                storage_error(format!("removing '{}': {error}", path.display()))
            })?;
            removed += 1;
        }
        Ok(removed)
    }

    fn read_dir(&self) -> PersistenceResult<Vec<fs::DirEntry>> {
        let entries = fs::read_dir(&self.directory).map_err(|error| {
            storage_error(format!(
                "listing '{}': {error}",
                self.directory.display()
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| storage_error(error.to_string()))?;
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .map_err(|error| storage_error(error.to_string()))?;
            if is_file {
                files.push(entry);
            }
        }
        Ok(files)
    }
}

impl TaskBackend for FileTaskStore {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn apply(&self, action: TaskAction, task: &Task) -> PersistenceResult<()> {
        match action {
            TaskAction::Delete => {
                let path = self.record_path(&task.id);
                fs::remove_file(&path).map_err(|error| {
                    let detail = if error.kind() == ErrorKind::NotFound {
                        format!("record missing at '{}'", path.display())
                    } else {
                        format!("removing '{}': {error}", path.display())
                    };
                    tracing::error!(
                        backend = BACKEND_NAME,
                        action = action.as_str(),
                        task_id = %task.id,
                        detail = %detail,
                        "file task delete failed"
                    );
                    CoreError::action_failed(
                        BACKEND_NAME,
                        action,
                        &task.id,
                        CoreErrorKind::StorageFailure,
                        detail,
                    )
                })
            }
            TaskAction::Create | TaskAction::Status | TaskAction::Output => {
                let staged = self.stage(action, task)?;
                let record_path = staged.record_path.clone();
                staged.publish().map_err(|error| {
                    tracing::error!(
                        backend = BACKEND_NAME,
                        action = action.as_str(),
                        task_id = %task.id,
                        error = %error,
                        "file task publish failed"
                    );
                    CoreError::action_failed(
                        BACKEND_NAME,
                        action,
                        &task.id,
                        CoreErrorKind::StorageFailure,
                        format!("renaming into '{}': {error}", record_path.display()),
                    )
                })
            }
        }
    }
}

fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.flush()
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

fn storage_error(message: String) -> CoreError {
    let mut error = CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("file store failed: {message}"),
    );
    error.backend = Some(BACKEND_NAME);
    error
}

#[cfg(test)]
mod tests {
    use super::is_temp_name;

    #[test]
    fn temp_names_are_hidden_siblings() {
        assert!(is_temp_name(".0123abcd.tmp"));
        assert!(!is_temp_name("0123abcd"));
        assert!(!is_temp_name(".0123abcd"));
    }
}
