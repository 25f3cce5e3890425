use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, named_params};

use crate::models::{CoreError, CoreErrorKind, Task, TaskAction, TaskId, TaskStatus};
use crate::persistence::{MigrationStore, PersistenceResult, TaskBackend};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};
use crate::sqlite::settings::SqliteSettings;

const BACKEND_NAME: &str = "sqlite";
const MIGRATIONS_TABLE: &str = "taskbench_schema_migrations";

const INSERT_TASK_SQL: &str = "
INSERT INTO tasks (id, status, cmd, args)
VALUES (:id, :status, :cmd, :args)
";
const UPDATE_STATUS_SQL: &str = "UPDATE tasks SET status = :status WHERE id = :id";
const UPDATE_OUTPUT_SQL: &str = "UPDATE tasks SET output = :output WHERE id = :id";
const DELETE_TASK_SQL: &str = "DELETE FROM tasks WHERE id = :id";

/// Shared handle to one SQLite database file.
///
/// Connections are opened lazily and parked in an idle list between
/// statements, so concurrent workers each hold their own connection while a
/// statement runs and contend on the database lock rather than on a mutex.
pub struct SqliteTaskStore {
    database_path: PathBuf,
    settings: SqliteSettings,
    idle: Mutex<Vec<Connection>>,
}

impl SqliteTaskStore {
    /// Opens the store and brings the schema to the latest version.
    pub fn open(
        database_path: impl Into<PathBuf>,
        settings: SqliteSettings,
    ) -> PersistenceResult<Self> {
        let store = Self {
            database_path: database_path.into(),
            settings,
            idle: Mutex::new(Vec::new()),
        };
        tracing::info!(
            path = %store.database_path.display(),
            busy_timeout_ms = settings.busy_timeout.as_millis() as u64,
            journal_mode = settings.journal_mode.as_str(),
            synchronous = settings.synchronous.as_str(),
            "opening sqlite task store"
        );
        store.migrate_to_latest()?;
        Ok(store)
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn settings(&self) -> &SqliteSettings {
        &self.settings
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    pub fn count_tasks(&self) -> PersistenceResult<u64> {
        self.with_connection("count_tasks", |connection| {
            let count: i64 = connection.query_row("SELECT COUNT(*) FROM tasks", [], |row| {
                row.get(0)
            })?;
            to_u64(count)
        })
    }

    /// Counts entries reachable through the status index.
    pub fn count_status_index_entries(&self) -> PersistenceResult<u64> {
        self.with_connection("count_status_index_entries", |connection| {
            let count: i64 = connection.query_row(
                "SELECT COUNT(*) FROM tasks INDEXED BY idx_tasks_status WHERE status >= ''",
                [],
                |row| row.get(0),
            )?;
            to_u64(count)
        })
    }

    /// Returns the first line of `PRAGMA integrity_check`, `"ok"` when healthy.
    pub fn integrity_check(&self) -> PersistenceResult<String> {
        self.with_connection("integrity_check", |connection| {
            connection.query_row("PRAGMA integrity_check", [], |row| row.get(0))
        })
    }

    pub fn load_task(&self, task_id: &TaskId) -> PersistenceResult<Option<Task>> {
        self.with_connection("load_task", |connection| {
            let mut statement = connection.prepare_cached(
                "SELECT id, status, cmd, args, output FROM tasks WHERE id = :id",
            )?;
            statement
                .query_row(named_params! { ":id": task_id.as_str() }, |row| {
                    let status_raw: String = row.get(1)?;
                    let args_raw: String = row.get(3)?;
                    let output: Option<String> = row.get(4)?;
                    Ok(Task {
                        id: task_id.clone(),
                        status: parse_task_status(&status_raw)?,
                        command: row.get(2)?,
                        args: parse_args(&args_raw)?,
                        output: output.unwrap_or_default(),
                    })
                })
                .optional()
        })
    }

    pub fn clear_tasks(&self) -> PersistenceResult<usize> {
        self.with_connection("clear_tasks", |connection| {
            connection.execute("DELETE FROM tasks", [])
        })
    }

    fn write(
        &self,
        action: TaskAction,
        task: &Task,
        args: Option<&str>,
    ) -> rusqlite::Result<usize> {
        self.checkout(|connection| match action {
            TaskAction::Create => connection.prepare_cached(INSERT_TASK_SQL)?.execute(
                named_params! {
                    ":id": task.id.as_str(),
                    ":status": task.status.as_str(),
                    ":cmd": task.command.as_str(),
                    ":args": args,
                },
            ),
            TaskAction::Status => connection.prepare_cached(UPDATE_STATUS_SQL)?.execute(
                named_params! {
                    ":id": task.id.as_str(),
                    ":status": task.status.as_str(),
                },
            ),
            TaskAction::Output => connection.prepare_cached(UPDATE_OUTPUT_SQL)?.execute(
                named_params! {
                    ":id": task.id.as_str(),
                    ":output": task.output.as_str(),
                },
            ),
            TaskAction::Delete => connection
                .prepare_cached(DELETE_TASK_SQL)?
                .execute(named_params! { ":id": task.id.as_str() }),
        })
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        self.checkout(operation)
            .map_err(|error| storage_error(operation_name, error))
    }

    fn checkout<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let parked = self
            .idle
            .lock()
            .map_err(|_| storage_error_sqlite("sqlite connection pool mutex poisoned"))?
            .pop();
        let mut connection = match parked {
            Some(connection) => connection,
            None => open_connection(&self.database_path, &self.settings)?,
        };

        let result = operation(&mut connection);

        if let Ok(mut idle) = self.idle.lock() {
            idle.push(connection);
        }
        result
    }
}

impl TaskBackend for SqliteTaskStore {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn apply(&self, action: TaskAction, task: &Task) -> PersistenceResult<()> {
        let args = match action {
            TaskAction::Create => Some(serde_json::to_string(&task.args).map_err(|error| {
                CoreError::action_failed(
                    BACKEND_NAME,
                    action,
                    &task.id,
                    CoreErrorKind::SerializationFailure,
                    error,
                )
            })?),
            _ => None,
        };

        let changed = self.write(action, task, args.as_deref()).map_err(|error| {
            tracing::error!(
                backend = BACKEND_NAME,
                action = action.as_str(),
                task_id = %task.id,
                error = %error,
                "sqlite task write failed"
            );
            CoreError::action_failed(
                BACKEND_NAME,
                action,
                &task.id,
                CoreErrorKind::StorageFailure,
                error,
            )
        })?;

        if changed != 1 {
            return Err(CoreError::action_failed(
                BACKEND_NAME,
                action,
                &task.id,
                CoreErrorKind::StorageFailure,
                format!("expected one affected row, found {changed}"),
            ));
        }
        Ok(())
    }
}

impl MigrationStore for SqliteTaskStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        if target_version > 0 && migration(target_version).is_none() {
            return Err(storage_error_text(
                "apply_migration",
                format!("migration version '{target_version}' is not defined"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // All DDL is IF [NOT] EXISTS, so replaying it repairs a schema
                // whose version row survived but whose objects did not.
                for version in 1..=target_version {
                    connection.execute_batch(defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    let migration = defined_migration(version)?;
                    tracing::info!(
                        version = migration.version,
                        name = migration.name,
                        "applying sqlite migration"
                    );
                    apply_up_migration(connection, migration)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    let migration = defined_migration(version)?;
                    tracing::info!(
                        version = migration.version,
                        name = migration.name,
                        "reverting sqlite migration"
                    );
                    apply_down_migration(connection, migration)?;
                }
            }

            Ok(())
        })
    }
}

fn open_connection(database_path: &Path, settings: &SqliteSettings) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    settings.apply(&connection)?;
    Ok(connection)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (:version, :name, strftime('%s', 'now'))"
        ),
        named_params! { ":version": migration.version, ":name": migration.name },
    )?;
    transaction.commit()
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = :version"),
        named_params! { ":version": migration.version },
    )?;
    transaction.commit()
}

fn parse_task_status(raw: &str) -> rusqlite::Result<TaskStatus> {
    raw.parse::<TaskStatus>().map_err(|message| {
        storage_error_sqlite(&format!("{message} in persisted sqlite record"))
    })
}

fn parse_args(raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(error))
    })
}

fn to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative row count from sqlite"))
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    let mut error = CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    );
    error.backend = Some(BACKEND_NAME);
    error
}
