#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "create_tasks",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT NOT NULL PRIMARY KEY,
    status TEXT NOT NULL,
    cmd TEXT NOT NULL,
    args TEXT NOT NULL,
    output TEXT NULL
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS tasks;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_task_status_index",
    up_sql: r#"
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_tasks_status;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
