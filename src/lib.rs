//! # Ironsift
//!
//! A **record extraction engine** for bulk XML archives. Ironsift pulls a
//! caller-chosen set of records out of yearly or weekly archive partitions in
//! which thousands of XML documents are concatenated into one file, such as
//! the bulk patent application corpus.
//!
//! ## Key Features
//!
//! - **Verified downloads** - bounded retries, `Content-Length` and manifest size checks
//! - **Boundary-scan location** - one regex pass per payload, then only the
//!   enclosing record is parsed and its own identifier verified
//! - **Field extraction** - a flat, CSV/JSONL-ready schema with per-field fallbacks
//! - **Idempotent cache** - identifiers are marked DONE only after their rows are durable
//! - **Checkpointed output** - periodic `fsync`ed flushes with crash recovery
//! - **Parallel partitions** - a bounded worker pool with explicit task outcomes
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironsift::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = EngineConfig {
//!     output_dir: "./applications".into(),
//!     cache: CacheBackend::AppendLog("./applications/done.log".into()),
//!     workers: Some(4),
//!     ..EngineConfig::default()
//! };
//!
//! let targets = TargetSet::from_csv_column("targets.csv", "application_number")?;
//! let partitions = load_partitions("partitions.csv")?;
//!
//! let summary = Scheduler::new(config)?.run(&targets, &partitions)?;
//! summary.print();
//! summary.save_to_file("summary.json")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Partitions and targets
//!
//! An [`ArchivePartition`] is one remote archive with a unique key; the key
//! names the partition's output file. A [`TargetSet`] holds canonical
//! identifiers: `"0000123"`, `" 123 "` and `"123.0"` all mean 123.
//!
//! ### Location
//!
//! Identifier digits appear all over a payload, not just in the record that
//! owns them. The [`Locator`] treats every textual hit as a candidate, takes
//! the nearest record start before it and the nearest record end after it,
//! parses only that span and keeps it only if the record's own identifier
//! matches. All hits are tried before an identifier is called absent.
//!
//! ### Completion
//!
//! A [`CompletionStore`] remembers which identifiers are DONE. Each task
//! snapshots what is still outstanding when it starts, so an identifier that
//! one partition lacks stays eligible for every other partition.
//!
//! ## Feature Flags
//!
//! - `archive-zip` - Read zip containers (default)
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz` -
//!   Single-stream codecs (all default)
//!
//! ## Module Overview
//!
//! - [`fetch`] - Verified, bounded-retry downloads over a pluggable transport
//! - [`archive`] - Zip and compressed-stream decoding
//! - [`locate`] - Boundary-scan record location
//! - [`extract`] - Field extraction into [`ExtractedRecord`]
//! - [`cache`] - Completion stores
//! - [`writer`] - Checkpointed partition output and crash recovery
//! - [`scheduler`] - Worker pool and run orchestration
//! - [`summary`] - Task outcomes and the run summary
//! - [`testing`] - Fake transport, in-memory stores and fixtures

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod ids;
pub mod locate;
pub mod partition;
pub mod scheduler;
pub mod summary;
pub mod testing;
pub mod writer;
pub mod xml;

pub use archive::{SubFile, decode_archive};
pub use cache::{AppendLogStore, CompletionStore, MarkerDirStore, open_store};
pub use config::{CacheBackend, EngineConfig, OutputFormat, OutputMode, RecordLayout};
pub use error::ExtractError;
pub use extract::{ClaimRecord, ExtractedRecord, Extractor, Provenance};
pub use fetch::{FetchOutcome, Fetcher, RetryPolicy, Transport, UreqTransport};
pub use ids::{TargetId, TargetSet, canonicalize};
pub use locate::{LocateReport, LocatedRecord, Locator, RecordSpan};
pub use partition::{ArchivePartition, Manifest, load_partitions};
pub use scheduler::Scheduler;
pub use summary::{RunSummary, TaskOutcome, TaskState};
pub use writer::{CheckpointedWriter, recover_outputs};
