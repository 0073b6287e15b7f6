//! Partition scheduler and worker pool.
//!
//! One task per partition runs on a local rayon pool. A task:
//!
//! 1. snapshots the outstanding identifiers (targets minus DONE),
//! 2. fetches and decodes the archive, skipping the partition if the fetch is
//!    exhausted,
//! 3. locates outstanding identifiers in every sub-file,
//! 4. re-checks the store, extracts each verified record, claims the
//!    identifier for this run and hands the record to the checkpointed writer.
//!
//! Task results are collected explicitly. A panic inside a task is caught and
//! reported as [`TaskState::Failed`]; it never takes down the pool or the
//! other tasks. Claims a failed task never flushed are released, so another
//! partition holding the same record can still emit it.
//!
//! ```no_run
//! use ironsift::{ArchivePartition, EngineConfig, Scheduler, TargetSet};
//!
//! # fn main() -> anyhow::Result<()> {
//! let scheduler = Scheduler::new(EngineConfig::default())?;
//! let targets = TargetSet::new([20_140_123, 20_150_999]);
//! let partitions = vec![
//!     ArchivePartition::new("2014", "https://example.org/bulk/ipa140101.zip"),
//!     ArchivePartition::new("2015", "https://example.org/bulk/ipa150101.zip"),
//! ];
//! let summary = scheduler.run(&targets, &partitions)?;
//! summary.print();
//! # Ok(())
//! # }
//! ```

use crate::archive::{SubFile, decode_archive};
use crate::cache::{CompletionStore, open_store};
use crate::config::{EngineConfig, OutputMode};
use crate::error::ExtractError;
use crate::extract::{Extractor, Provenance};
use crate::fetch::{FetchOutcome, Fetcher, Transport, UreqTransport};
use crate::ids::{TargetId, TargetSet};
use crate::locate::Locator;
use crate::partition::{ArchivePartition, Manifest, ensure_unique_keys};
use crate::summary::{RunSummary, TaskOutcome, TaskState};
use crate::writer::{CheckpointedWriter, output_path, recover_outputs};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub struct Scheduler {
    config: EngineConfig,
    fetcher: Fetcher,
    locator: Locator,
    extractor: Extractor,
    store: Arc<dyn CompletionStore>,
}

/// State shared by the tasks of one run.
struct RunContext<'a> {
    targets: &'a TargetSet,
    /// Identifiers some task of this run has already buffered.
    claimed: Mutex<HashSet<TargetId>>,
}

impl RunContext<'_> {
    fn claim(&self, id: TargetId) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    fn release(&self, ids: &[TargetId]) {
        if ids.is_empty() {
            return;
        }
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            claimed.remove(id);
        }
    }
}

impl Scheduler {
    /// Build a scheduler with an HTTP transport and the configured store.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the store cannot
    /// be opened.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let transport = Arc::new(UreqTransport::new(Duration::from_secs(config.request_timeout_secs)));
        let store = open_store(&config.cache)?;
        Self::with_parts(config, transport, store)
    }

    /// Build a scheduler around an explicit transport and store.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn with_parts(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CompletionStore>,
    ) -> Result<Self> {
        config.validate()?;
        let fetcher = Fetcher::new(transport, config.retry).require_content_length(config.require_content_length);
        let locator = Locator::new(&config.layout)?;
        let extractor = Extractor::new(config.layout.clone(), config.cancel_max_letters, config.keep_raw_xml);
        Ok(Self {
            config,
            fetcher,
            locator,
            extractor,
            store,
        })
    }

    /// Verify downloads against recorded archive sizes.
    #[must_use]
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.fetcher = self.fetcher.with_manifest(manifest);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CompletionStore> {
        &self.store
    }

    /// Process every partition and report what happened.
    ///
    /// Partition-level failures are reported in the summary, not returned.
    ///
    /// # Errors
    /// Returns an error only for problems that stop the run before any task
    /// starts: duplicate partition keys, failed output recovery, or a worker
    /// pool that cannot be built.
    pub fn run(&self, targets: &TargetSet, partitions: &[ArchivePartition]) -> Result<RunSummary> {
        let started = Instant::now();
        ensure_unique_keys(partitions)?;

        let mut summary = RunSummary {
            requested: targets.len(),
            ..RunSummary::default()
        };

        if self.config.output_mode == OutputMode::Append {
            let recovery = recover_outputs(
                &self.config.output_dir,
                &self.config.output_prefix,
                self.config.output_format,
                self.store.as_ref(),
            )?;
            summary.recovered = recovery.reconciled;
        } else if !self.config.force_reprocess {
            warn!("fresh output mode without force_reprocess: truncated rows of DONE ids are not regenerated");
        }

        if !self.config.force_reprocess {
            summary.already_done = targets.iter().filter(|id| self.store.has(*id)).count();
        }

        let workers = self.config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ironsift-worker-{i}"))
            .build()
            .context("build worker pool")?;
        info!(
            partitions = partitions.len(),
            targets = targets.len(),
            already_done = summary.already_done,
            workers,
            "starting run"
        );

        let ctx = RunContext {
            targets,
            claimed: Mutex::new(HashSet::new()),
        };
        let outcomes: Vec<TaskOutcome> =
            pool.install(|| partitions.par_iter().map(|p| self.run_guarded(p, &ctx)).collect());

        for outcome in outcomes {
            summary.absorb(outcome);
        }
        summary.found = summary.records_written;
        summary.not_found_this_run = summary
            .requested
            .saturating_sub(summary.already_done)
            .saturating_sub(summary.found);
        summary.set_elapsed(started.elapsed());
        info!(
            found = summary.found,
            not_found = summary.not_found_this_run,
            skipped = summary.skipped_partitions.len(),
            failed = summary.failed_partitions.len(),
            "run finished"
        );
        Ok(summary)
    }

    fn run_guarded(&self, partition: &ArchivePartition, ctx: &RunContext<'_>) -> TaskOutcome {
        let started = Instant::now();
        let mut outcome = TaskOutcome::new(&partition.key);
        // Claimed ids in push order; the writer flushes a prefix of them.
        let mut claims: Vec<TargetId> = Vec::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.run_partition(partition, ctx, &mut claims, &mut outcome)
        }));
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                error!(partition = %partition.key, error = %format!("{err:#}"), "partition failed");
                Some(format!("{err:#}"))
            }
            Err(payload) => {
                let reason = format!("panic: {}", panic_message(payload.as_ref()));
                error!(partition = %partition.key, %reason, "partition task panicked");
                Some(reason)
            }
        };
        if let Some(reason) = failure {
            let unflushed = &claims[outcome.records_written.min(claims.len())..];
            if !unflushed.is_empty() {
                warn!(partition = %partition.key, released = unflushed.len(), "releasing unflushed claims");
            }
            ctx.release(unflushed);
            outcome.state = TaskState::Failed(reason);
        }
        outcome.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        outcome
    }

    fn run_partition(
        &self,
        partition: &ArchivePartition,
        ctx: &RunContext<'_>,
        claims: &mut Vec<TargetId>,
        outcome: &mut TaskOutcome,
    ) -> Result<()> {
        let outstanding: HashSet<TargetId> = ctx
            .targets
            .iter()
            .filter(|id| self.config.force_reprocess || !self.store.has(*id))
            .collect();
        outcome.outstanding = outstanding.len();
        if outstanding.is_empty() {
            info!(partition = %partition.key, "nothing outstanding");
            return Ok(());
        }
        info!(partition = %partition.key, outstanding = outstanding.len(), url = %partition.source_url, "partition started");

        let bytes = match self.fetcher.fetch(&partition.source_url, partition.expected_byte_length) {
            FetchOutcome::Fetched(bytes) => bytes,
            FetchOutcome::Exhausted { attempts, last_error } => {
                let err = ExtractError::TransientNetwork {
                    url: partition.source_url.clone(),
                    attempts,
                    reason: last_error,
                };
                warn!(partition = %partition.key, "skipping partition: {err}");
                outcome.state = TaskState::Skipped(err.to_string());
                return Ok(());
            }
        };
        let sub_files = decode_archive(&bytes, &partition.source_url)
            .with_context(|| format!("decode {}", partition.source_url))?;
        drop(bytes);

        let path = output_path(
            &self.config.output_dir,
            &self.config.output_prefix,
            &partition.key,
            self.config.output_format,
        );
        let mut writer = CheckpointedWriter::open(
            &path,
            self.config.output_format,
            self.config.output_mode,
            self.config.checkpoint_every,
            Arc::clone(&self.store),
            self.config.retry,
        )?;

        let scanned = self.scan_sub_files(partition, &sub_files, outstanding, ctx, claims, &mut writer, outcome);
        let finished = scanned.and_then(|()| writer.flush());
        let stats = writer.stats();
        outcome.records_written = stats.records_written;
        outcome.cache_errors.clone_from(&stats.cache_write_failures);
        finished?;

        info!(
            partition = %partition.key,
            located = outcome.located,
            written = outcome.records_written,
            malformed = outcome.malformed,
            "partition completed"
        );
        Ok(())
    }

    fn scan_sub_files(
        &self,
        partition: &ArchivePartition,
        sub_files: &[SubFile],
        mut outstanding: HashSet<TargetId>,
        ctx: &RunContext<'_>,
        claims: &mut Vec<TargetId>,
        writer: &mut CheckpointedWriter,
        outcome: &mut TaskOutcome,
    ) -> Result<()> {
        for sub in sub_files {
            if outstanding.is_empty() {
                break;
            }
            let report = self.locator.locate(&sub.text, &outstanding);
            for m in &report.malformed {
                let err = ExtractError::MalformedRecord {
                    partition: partition.key.clone(),
                    sub_file: sub.name.clone(),
                    offset: m.offset,
                    reason: m.reason.clone(),
                };
                warn!(partition = %partition.key, sub_file = %sub.name, offset = m.offset, "{err}");
            }
            outcome.malformed += report.malformed.len();
            outcome.cross_references += report.cross_references;

            let provenance = Provenance {
                partition_key: partition.key.clone(),
                sub_file: sub.name.clone(),
            };
            for located in &report.found {
                let id = located.span.identifier;
                outstanding.remove(&id);
                outcome.located += 1;
                if !self.config.force_reprocess && self.store.has(id) {
                    continue;
                }
                let extraction = self.extractor.extract(located, &sub.text, &provenance);
                if !ctx.claim(id) {
                    outcome.duplicates_suppressed += 1;
                    continue;
                }
                claims.push(id);
                outcome.field_warnings += extraction.warnings.len();
                writer.push(extraction.record)?;
                outcome.records_written = writer.stats().records_written;
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
