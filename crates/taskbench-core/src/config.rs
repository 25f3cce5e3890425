use std::path::PathBuf;

use crate::harness::HarnessPlan;
use crate::models::{CoreError, CoreErrorKind, CoreResult};
use crate::sqlite::SqliteSettings;

pub const DEFAULT_WORKERS: usize = 100;
pub const DEFAULT_REPETITIONS: usize = 100;
pub const DEFAULT_ROUNDS: usize = 3;
pub const DEFAULT_SQLITE_PATH: &str = "./tmp.db";
pub const DEFAULT_FILE_DIRECTORY: &str = "./tmp";

/// Benchmark parameters. The process entry point only ever uses `Default`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BenchConfig {
    pub workers: usize,
    pub repetitions: usize,
    /// Each round times one run per backend.
    pub rounds: usize,
    pub sqlite_path: PathBuf,
    pub file_directory: PathBuf,
    pub sqlite: SqliteSettings,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            repetitions: DEFAULT_REPETITIONS,
            rounds: DEFAULT_ROUNDS,
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            file_directory: PathBuf::from(DEFAULT_FILE_DIRECTORY),
            sqlite: SqliteSettings::default(),
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.rounds == 0 {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "benchmark needs at least one round",
            ));
        }
        self.plan().map(|_| ())
    }

    pub fn plan(&self) -> CoreResult<HarnessPlan> {
        HarnessPlan::new(self.workers, self.repetitions)
    }
}
