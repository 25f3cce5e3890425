use std::fmt::{Display, Formatter, Write};
use std::time::Duration;

/// Outcome of one fully joined harness run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunReport {
    pub label: String,
    pub backend: &'static str,
    pub workers: usize,
    pub repetitions: usize,
    pub tasks: u64,
    pub actions: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn tasks_per_second(&self) -> f64 {
        per_second(self.tasks, self.elapsed)
    }

    pub fn actions_per_second(&self) -> f64 {
        per_second(self.actions, self.elapsed)
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ran {} tasks ({} actions) in {:?} ({:.0} tasks/s)",
            self.label,
            self.tasks,
            self.actions,
            self.elapsed,
            self.tasks_per_second()
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackendSummary {
    pub backend: &'static str,
    pub runs: usize,
    pub mean_elapsed: Duration,
    pub min_elapsed: Duration,
    pub max_elapsed: Duration,
    pub mean_tasks_per_second: f64,
}

impl BackendSummary {
    /// Groups reports by backend, keeping the order backends first appear in.
    pub fn from_reports(reports: &[RunReport]) -> Vec<BackendSummary> {
        let mut backends: Vec<&'static str> = Vec::new();
        for report in reports {
            if !backends.contains(&report.backend) {
                backends.push(report.backend);
            }
        }

        backends
            .into_iter()
            .filter_map(|backend| {
                let runs: Vec<&RunReport> = reports
                    .iter()
                    .filter(|report| report.backend == backend)
                    .collect();
                let min_elapsed = runs.iter().map(|report| report.elapsed).min()?;
                let max_elapsed = runs.iter().map(|report| report.elapsed).max()?;
                let total: Duration = runs.iter().map(|report| report.elapsed).sum();
                let count = u32::try_from(runs.len()).ok()?;
                let mean_tasks_per_second = runs
                    .iter()
                    .map(|report| report.tasks_per_second())
                    .sum::<f64>()
                    / runs.len() as f64;

                Some(BackendSummary {
                    backend,
                    runs: runs.len(),
                    mean_elapsed: total / count,
                    min_elapsed,
                    max_elapsed,
                    mean_tasks_per_second,
                })
            })
            .collect()
    }
}

pub fn render_summary(summaries: &[BackendSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:10} {:>5} {:>14} {:>14} {:>14} {:>12}",
        "Backend", "Runs", "Mean", "Min", "Max", "Tasks/s"
    );
    let _ = writeln!(out, "  {}", "-".repeat(74));
    for summary in summaries {
        let _ = writeln!(
            out,
            "  {:10} {:>5} {:>14} {:>14} {:>14} {:>12.0}",
            summary.backend,
            summary.runs,
            format!("{:.2?}", summary.mean_elapsed),
            format!("{:.2?}", summary.min_elapsed),
            format!("{:.2?}", summary.max_elapsed),
            summary.mean_tasks_per_second
        );
    }
    out
}

pub fn print_summary(summaries: &[BackendSummary]) {
    println!("\n  Summary:");
    print!("{}", render_summary(summaries));
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    count as f64 / seconds
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{BackendSummary, RunReport, render_summary};

    fn report(backend: &'static str, millis: u64) -> RunReport {
        RunReport {
            label: backend.to_uppercase(),
            backend,
            workers: 10,
            repetitions: 10,
            tasks: 100,
            actions: 1300,
            elapsed: Duration::from_millis(millis),
        }
    }

    #[test]
    fn display_names_label_tasks_and_actions() {
        let line = report("sqlite", 500).to_string();
        assert!(line.starts_with("SQLITE ran 100 tasks (1300 actions) in 500ms"));
        assert!(line.ends_with("(200 tasks/s)"));
    }

    #[test]
    fn zero_elapsed_reports_zero_throughput() {
        assert_eq!(report("file", 0).tasks_per_second(), 0.0);
    }

    #[test]
    fn summaries_group_by_backend_in_first_seen_order() {
        let reports = vec![
            report("sqlite", 100),
            report("file", 400),
            report("sqlite", 300),
        ];
        let summaries = BackendSummary::from_reports(&reports);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].backend, "sqlite");
        assert_eq!(summaries[0].runs, 2);
        assert_eq!(summaries[0].mean_elapsed, Duration::from_millis(200));
        assert_eq!(summaries[0].min_elapsed, Duration::from_millis(100));
        assert_eq!(summaries[0].max_elapsed, Duration::from_millis(300));
        assert_eq!(summaries[1].backend, "file");

        let table = render_summary(&summaries);
        assert_eq!(table.lines().count(), 4);
    }
}
