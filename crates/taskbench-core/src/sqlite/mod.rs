pub mod migrations;
pub mod settings;
pub mod store;

pub use migrations::{SqliteMigration, current_schema_version, migration, migrations};
pub use settings::{JournalMode, SqliteSettings, SynchronousLevel};
pub use store::SqliteTaskStore;
