use std::time::Duration;

use rusqlite::Connection;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JournalMode {
    Delete,
    Truncate,
    Wal,
}

impl JournalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Truncate => "truncate",
            Self::Wal => "wal",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SynchronousLevel {
    Off,
    Normal,
    Full,
}

impl SynchronousLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

/// Connection settings that let many writers share one database file.
///
/// Contended writers wait up to `busy_timeout` for the write lock instead of
/// failing with `SQLITE_BUSY`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteSettings {
    pub busy_timeout: Duration,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousLevel,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousLevel::Normal,
        }
    }
}

impl SqliteSettings {
    pub(crate) fn apply(&self, connection: &Connection) -> rusqlite::Result<()> {
        connection.busy_timeout(self.busy_timeout)?;

        let mode: String = connection.pragma_update_and_check(
            None,
            "journal_mode",
            self.journal_mode.as_str(),
            |row| row.get(0),
        )?;
        if !mode.eq_ignore_ascii_case(self.journal_mode.as_str()) {
            return Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
                std::io::Error::other(format!(
                    "journal mode '{}' was requested but sqlite reports '{mode}'",
                    self.journal_mode.as_str()
                )),
            )));
        }

        connection.pragma_update(None, "synchronous", self.synchronous.as_str())?;
        Ok(())
    }
}
