//! Persistent record of completed identifiers.
//!
//! An identifier moves from UNSEEN to DONE exactly once, and only after its
//! record has been durably written. Nothing ever moves it back. The scheduler
//! consults the store when snapshotting a task's work list and again right
//! before buffering a record, so concurrent tasks that race on the same
//! identifier emit it at most once across runs.
//!
//! Two backends ship with the crate:
//! - [`MarkerDirStore`]: one empty file per identifier. Safe to share between
//!   processes; every marker is created with an atomic rename.
//! - [`AppendLogStore`]: one append-only log, loaded into memory on open.
//!   Cheaper for very large target sets; one process at a time.

mod log;
mod markers;

pub use log::AppendLogStore;
pub use markers::MarkerDirStore;

use crate::config::CacheBackend;
use crate::ids::TargetId;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Completion store shared by all workers.
pub trait CompletionStore: Send + Sync {
    /// Whether `id` is DONE.
    fn has(&self, id: TargetId) -> bool;

    /// Durably mark `id` DONE. Marking a DONE id again is a no-op.
    ///
    /// # Errors
    /// Returns an error if the marker could not be persisted; `id` stays UNSEEN.
    fn mark_done(&self, id: TargetId) -> Result<()>;

    /// Every DONE identifier.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn done_ids(&self) -> Result<HashSet<TargetId>>;
}

/// Open the store described by a configured backend.
///
/// # Errors
/// Returns an error if the directory or log cannot be created or read.
pub fn open_store(backend: &CacheBackend) -> Result<Arc<dyn CompletionStore>> {
    Ok(match backend {
        CacheBackend::MarkerDir(dir) => Arc::new(MarkerDirStore::open(dir)?),
        CacheBackend::AppendLog(path) => Arc::new(AppendLogStore::open(path)?),
    })
}
