//! Checkpointed, append-only output per partition.
//!
//! Records are buffered and flushed every `checkpoint_every` records and once
//! more when the partition finishes. A flush is ordered so that a crash at any
//! point loses at most the unflushed buffer:
//!
//! 1. serialize the whole buffer and append it to the partition file,
//! 2. flush and `fsync` the file,
//! 3. only then mark each flushed identifier DONE in the completion store.
//!
//! A crash between 2 and 3 leaves rows on disk whose identifiers are still
//! UNSEEN. [`recover_outputs`] closes that window before the next run by
//! reading the existing outputs back, cutting off a torn final row, and marking
//! every identifier it finds DONE.

use crate::cache::CompletionStore;
use crate::config::{OutputFormat, OutputMode};
use crate::error::ExtractError;
use crate::extract::ExtractedRecord;
use crate::fetch::{RetryExhausted, RetryPolicy, retry_with_backoff};
use crate::ids::TargetId;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::{File, OpenOptions, create_dir_all, read_dir};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Output file of one partition: `{dir}/{prefix}_{key}.{ext}`.
#[must_use]
pub fn output_path(dir: &Path, prefix: &str, key: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("{prefix}_{key}.{}", format.extension()))
}

/// Counters accumulated by one writer.
#[derive(Debug, Default)]
pub struct WriterStats {
    pub records_written: usize,
    pub flushes: usize,
    /// Identifiers whose rows are on disk but could not be marked DONE.
    pub cache_write_failures: Vec<ExtractError>,
}

pub struct CheckpointedWriter {
    path: PathBuf,
    format: OutputFormat,
    file: File,
    needs_header: bool,
    buffer: Vec<ExtractedRecord>,
    checkpoint_every: usize,
    store: Arc<dyn CompletionStore>,
    retry: RetryPolicy,
    stats: WriterStats,
}

impl CheckpointedWriter {
    /// Open the output for a partition. `Fresh` truncates an existing file,
    /// `Append` keeps it.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be created.
    pub fn open(
        path: impl AsRef<Path>,
        format: OutputFormat,
        mode: OutputMode,
        checkpoint_every: usize,
        store: Arc<dyn CompletionStore>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let mut opts = OpenOptions::new();
        match mode {
            OutputMode::Append => opts.create(true).append(true),
            OutputMode::Fresh => opts.create(true).write(true).truncate(true),
        };
        let file = opts.open(&path).with_context(|| format!("open {}", path.display()))?;
        let existing = file
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        Ok(Self {
            path,
            format,
            file,
            needs_header: existing == 0,
            buffer: Vec::new(),
            checkpoint_every: checkpoint_every.max(1),
            store,
            retry,
            stats: WriterStats::default(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Buffer a record, flushing when the checkpoint interval is reached.
    ///
    /// # Errors
    /// Returns an error if a triggered flush fails to write the file.
    pub fn push(&mut self, record: ExtractedRecord) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.checkpoint_every {
            self.flush()?;
        }
        Ok(())
    }

    /// Durably write the buffer, then mark its identifiers DONE.
    ///
    /// Cache failures do not fail the flush; they are collected in
    /// [`WriterStats::cache_write_failures`].
    ///
    /// # Errors
    /// Returns an error if the rows cannot be serialized, written or synced.
    /// The buffer is kept in that case and no identifier is marked.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let bytes = self.serialize_buffer()?;
        self.file
            .write_all(&bytes)
            .with_context(|| format!("append to {}", self.path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        self.file
            .sync_data()
            .with_context(|| format!("sync {}", self.path.display()))?;
        self.needs_header = false;

        let flushed = std::mem::take(&mut self.buffer);
        for record in &flushed {
            self.mark_done(record.app_id);
        }
        self.stats.records_written += flushed.len();
        self.stats.flushes += 1;
        debug!(path = %self.path.display(), records = flushed.len(), "checkpoint flushed");
        Ok(())
    }

    /// Flush what is left and return the counters.
    ///
    /// # Errors
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> Result<WriterStats> {
        self.flush()?;
        Ok(self.stats)
    }

    fn mark_done(&mut self, id: TargetId) {
        let store = &self.store;
        let result = retry_with_backoff(&self.retry, |_| store.mark_done(id).map_err(|e| format!("{e:#}")));
        if let Err(RetryExhausted { attempts, last_error }) = result {
            error!(id, attempts, error = %last_error, "record written but not marked done");
            self.stats.cache_write_failures.push(ExtractError::CacheWrite {
                id,
                reason: last_error,
            });
        }
    }

    fn serialize_buffer(&self) -> Result<Vec<u8>> {
        match self.format {
            OutputFormat::Csv => {
                let mut wtr = csv::WriterBuilder::new()
                    .has_headers(self.needs_header)
                    .from_writer(Vec::new());
                for (i, rec) in self.buffer.iter().enumerate() {
                    wtr.serialize(rec)
                        .with_context(|| format!("serialize CSV row #{}", i + 1))?;
                }
                wtr.into_inner()
                    .map_err(|e| anyhow::anyhow!("finish CSV rows for {}: {}", self.path.display(), e.error()))
            }
            OutputFormat::Jsonl => {
                let mut out = Vec::new();
                for (i, rec) in self.buffer.iter().enumerate() {
                    serde_json::to_writer(&mut out, rec)
                        .with_context(|| format!("serialize item #{} to {}", i, self.path.display()))?;
                    out.push(b'\n');
                }
                Ok(out)
            }
        }
    }
}

// ============================================================================
// Crash recovery
// ============================================================================

/// What [`recover_outputs`] found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub files_scanned: usize,
    pub torn_tails_truncated: usize,
    /// Rows found in the outputs.
    pub rows_found: usize,
    /// Identifiers that were on disk but not yet DONE.
    pub reconciled: usize,
}

#[derive(Deserialize)]
struct IdOnly {
    app_id: TargetId,
}

/// Repair the outputs of a previous run and reconcile the store with them.
///
/// Scans `{dir}/{prefix}_*.{ext}`. A final row that is incomplete is cut off;
/// unreadable rows before it are kept and skipped. Every identifier in a
/// complete row is marked DONE.
///
/// # Errors
/// Returns an error if an output cannot be read or truncated, or the store
/// rejects a marker.
pub fn recover_outputs(
    dir: &Path,
    prefix: &str,
    format: OutputFormat,
    store: &dyn CompletionStore,
) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    if !dir.exists() {
        return Ok(report);
    }
    let suffix = format!(".{}", format.extension());
    let lead = format!("{prefix}_");
    let mut paths: Vec<PathBuf> = read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(&lead) && n.ends_with(&suffix))
        })
        .map(|e| e.path())
        .collect();
    paths.sort();

    for path in paths {
        report.files_scanned += 1;
        let mut bytes = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .with_context(|| format!("read {}", path.display()))?;
        let (ids, good_end) = match format {
            OutputFormat::Csv => scan_csv(&bytes, &path)?,
            OutputFormat::Jsonl => scan_jsonl(&bytes, &path),
        };
        if good_end < bytes.len() {
            warn!(path = %path.display(), kept = good_end, dropped = bytes.len() - good_end, "truncating torn tail");
            let f = OpenOptions::new()
                .write(true)
                .open(&path)
                .with_context(|| format!("open {}", path.display()))?;
            f.set_len(good_end as u64)
                .with_context(|| format!("truncate {}", path.display()))?;
            f.sync_all()
                .with_context(|| format!("sync {}", path.display()))?;
            report.torn_tails_truncated += 1;
        }
        report.rows_found += ids.len();
        for id in ids {
            if !store.has(id) {
                store
                    .mark_done(id)
                    .with_context(|| format!("reconcile {id} from {}", path.display()))?;
                report.reconciled += 1;
            }
        }
    }
    if report.reconciled > 0 || report.torn_tails_truncated > 0 {
        info!(
            files = report.files_scanned,
            torn = report.torn_tails_truncated,
            reconciled = report.reconciled,
            "recovered outputs of an interrupted run"
        );
    }
    Ok(report)
}

/// Identifiers of readable rows and the byte length to keep.
fn scan_csv(bytes: &[u8], path: &Path) -> Result<(Vec<TargetId>, usize)> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let headers = match rdr.byte_headers() {
        Ok(h) => h.clone(),
        Err(_) => return Ok((Vec::new(), 0)),
    };
    let header_end = usize::try_from(rdr.position().byte()).unwrap_or(bytes.len());
    if header_end == 0 || bytes.get(header_end - 1) != Some(&b'\n') {
        // Not even a complete header line.
        return Ok((Vec::new(), 0));
    }
    let id_col = headers
        .iter()
        .position(|h| h == b"app_id")
        .with_context(|| format!("no app_id column in {}", path.display()))?;

    let mut ids = Vec::new();
    let mut good_end = header_end;
    let mut record = csv::ByteRecord::new();
    loop {
        match rdr.read_byte_record(&mut record) {
            Ok(true) => {}
            Ok(false) | Err(_) => break,
        }
        let end = usize::try_from(rdr.position().byte()).unwrap_or(bytes.len());
        let terminated = end > 0 && bytes.get(end - 1) == Some(&b'\n');
        let id = if record.len() == headers.len() {
            record
                .get(id_col)
                .and_then(|f| std::str::from_utf8(f).ok())
                .and_then(|f| f.trim().parse::<TargetId>().ok())
        } else {
            None
        };
        match id {
            Some(id) if terminated => ids.push(id),
            // Only the last row can be torn.
            _ if !terminated || end >= bytes.len() => break,
            _ => {
                let line = record.position().map_or(0, csv::Position::line);
                warn!(path = %path.display(), line, fields = record.len(), "skipping unreadable row");
            }
        }
        good_end = end;
    }
    Ok((ids, good_end))
}

fn scan_jsonl(bytes: &[u8], path: &Path) -> (Vec<TargetId>, usize) {
    let good_end = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let mut ids = Vec::new();
    for (i, line) in bytes[..good_end].split(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<IdOnly>(line) {
            Ok(row) => ids.push(row.app_id),
            Err(e) => warn!(path = %path.display(), line = i + 1, error = %e, "skipping unreadable row"),
        }
    }
    (ids, good_end)
}
