//! Per-task outcomes and the end-of-run summary.
//!
//! Every partition task reports a [`TaskOutcome`]; the scheduler folds them
//! into one [`RunSummary`] that can be printed or saved as JSON.
//!
//! ```no_run
//! # fn demo(summary: &ironsift::summary::RunSummary) -> anyhow::Result<()> {
//! summary.print();
//! summary.save_to_file("run_summary.json")?;
//! # Ok(())
//! # }
//! ```

use crate::error::ExtractError;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Terminal state of one partition task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum TaskState {
    Completed,
    /// Fetch exhausted its retries; the partition is retried on a later run.
    Skipped(String),
    /// Unexpected error or panic inside the task.
    Failed(String),
}

/// What one partition task did.
#[derive(Clone, Debug, Serialize)]
pub struct TaskOutcome {
    pub partition: String,
    pub state: TaskState,
    /// Identifiers outstanding when the task started.
    pub outstanding: usize,
    /// Identifiers located and verified in this partition.
    pub located: usize,
    pub malformed: usize,
    pub cross_references: usize,
    pub field_warnings: usize,
    pub records_written: usize,
    /// Ids found here that another task of this run had already claimed.
    pub duplicates_suppressed: usize,
    #[serde(skip)]
    pub cache_errors: Vec<ExtractError>,
    pub elapsed_ms: u64,
}

impl TaskOutcome {
    pub(crate) fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            state: TaskState::Completed,
            outstanding: 0,
            located: 0,
            malformed: 0,
            cross_references: 0,
            field_warnings: 0,
            records_written: 0,
            duplicates_suppressed: 0,
            cache_errors: Vec::new(),
            elapsed_ms: 0,
        }
    }
}

/// Aggregate of a whole run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    /// Distinct target identifiers requested.
    pub requested: usize,
    /// Target identifiers written during this run.
    pub found: usize,
    /// Requested identifiers neither DONE before the run nor found in it.
    pub not_found_this_run: usize,
    /// Requested identifiers already DONE when the run started.
    pub already_done: usize,
    pub malformed: usize,
    pub field_warnings: usize,
    pub skipped_partitions: Vec<String>,
    pub failed_partitions: Vec<String>,
    pub cache_write_failures: usize,
    pub records_written: usize,
    /// Rows reconciled from a previous interrupted run.
    pub recovered: usize,
    pub elapsed_ms: u64,
    pub partitions: Vec<TaskOutcome>,
}

impl RunSummary {
    pub(crate) fn absorb(&mut self, outcome: TaskOutcome) {
        self.malformed += outcome.malformed;
        self.field_warnings += outcome.field_warnings;
        self.cache_write_failures += outcome.cache_errors.len();
        self.records_written += outcome.records_written;
        match &outcome.state {
            TaskState::Completed => {}
            TaskState::Skipped(_) => self.skipped_partitions.push(outcome.partition.clone()),
            TaskState::Failed(_) => self.failed_partitions.push(outcome.partition.clone()),
        }
        self.partitions.push(outcome);
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }

    /// Whether every partition completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped_partitions.is_empty() && self.failed_partitions.is_empty() && self.cache_write_failures == 0
    }

    /// Outcome for a partition key.
    #[must_use]
    pub fn partition(&self, key: &str) -> Option<&TaskOutcome> {
        self.partitions.iter().find(|p| p.partition == key)
    }

    /// Print a human-readable report to stdout.
    pub fn print(&self) {
        println!("\n========== Extraction Summary ==========");
        println!(
            "Execution Time: {:.3}s ({} ms)",
            Duration::from_millis(self.elapsed_ms).as_secs_f64(),
            self.elapsed_ms
        );
        println!("----------------------------------------");
        println!("requested: {}", self.requested);
        println!("already_done: {}", self.already_done);
        println!("found: {}", self.found);
        println!("not_found_this_run: {}", self.not_found_this_run);
        println!("records_written: {}", self.records_written);
        println!("recovered: {}", self.recovered);
        println!("malformed: {}", self.malformed);
        println!("field_warnings: {}", self.field_warnings);
        println!("cache_write_failures: {}", self.cache_write_failures);
        println!("skipped_partitions: {:?}", self.skipped_partitions);
        println!("failed_partitions: {:?}", self.failed_partitions);
        println!("----------------------------------------");
        for p in &self.partitions {
            let state = match &p.state {
                TaskState::Completed => "completed".to_string(),
                TaskState::Skipped(reason) => format!("skipped ({reason})"),
                TaskState::Failed(reason) => format!("failed ({reason})"),
            };
            println!(
                "{}: {} located={} written={} malformed={} [{} ms]",
                p.partition, state, p.located, p.records_written, p.malformed, p.elapsed_ms
            );
        }
        println!("========================================\n");
    }

    /// Save the summary as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(self).context("serialize run summary")?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}
