use std::process::ExitCode;
use std::sync::Arc;

use taskbench_core::config::BenchConfig;
use taskbench_core::file_store::FileTaskStore;
use taskbench_core::harness::{self, HarnessPlan};
use taskbench_core::logging;
use taskbench_core::models::CoreResult;
use taskbench_core::persistence::TaskBackend;
use taskbench_core::report::{BackendSummary, RunReport, print_summary};
use taskbench_core::sqlite::SqliteTaskStore;

fn main() -> ExitCode {
    logging::init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create Tokio runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(BenchConfig::default())) {
        Ok(reports) => {
            print_summary(&BackendSummary::from_reports(&reports));
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(kind = ?error.kind, message = %error.message, "benchmark aborted");
            eprintln!("Benchmark aborted: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: BenchConfig) -> CoreResult<Vec<RunReport>> {
    config.validate()?;
    let plan = config.plan()?;

    println!("Opening...");
    let sqlite: Arc<dyn TaskBackend> =
        Arc::new(SqliteTaskStore::open(&config.sqlite_path, config.sqlite)?);
    let files: Arc<dyn TaskBackend> = Arc::new(FileTaskStore::open(&config.file_directory)?);

    let mut reports = Vec::with_capacity(config.rounds * 2);
    for round in 1..=config.rounds {
        tracing::debug!(round, rounds = config.rounds, "starting round");
        reports.push(timed("SQL", sqlite.clone(), plan).await?);
        reports.push(timed("FILE", files.clone(), plan).await?);
    }
    Ok(reports)
}

async fn timed(
    label: &str,
    backend: Arc<dyn TaskBackend>,
    plan: HarnessPlan,
) -> CoreResult<RunReport> {
    let report = harness::run_concurrent(label, backend, plan).await?;
    println!("{report}");
    Ok(report)
}
