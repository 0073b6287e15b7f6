//! In-memory completion stores.

use crate::cache::CompletionStore;
use crate::ids::TargetId;
use anyhow::{Result, bail};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Completion store that forgets everything when dropped.
#[derive(Default)]
pub struct MemoryStore {
    done: Mutex<HashSet<TargetId>>,
    marks: AtomicU32,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts with `ids` already DONE.
    #[must_use]
    pub fn with_done(ids: impl IntoIterator<Item = TargetId>) -> Self {
        Self {
            done: Mutex::new(ids.into_iter().collect()),
            marks: AtomicU32::new(0),
        }
    }

    /// Successful `mark_done` calls that changed state.
    #[must_use]
    pub fn marks(&self) -> u32 {
        self.marks.load(Ordering::SeqCst)
    }
}

impl CompletionStore for MemoryStore {
    fn has(&self, id: TargetId) -> bool {
        self.done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    fn mark_done(&self, id: TargetId) -> Result<()> {
        let inserted = self
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        if inserted {
            self.marks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn done_ids(&self) -> Result<HashSet<TargetId>> {
        Ok(self.done.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// Wraps a store and fails `mark_done` for chosen identifiers.
pub struct FlakyStore<S> {
    inner: S,
    /// Identifiers that always fail to persist.
    broken: HashSet<TargetId>,
    /// Leading `mark_done` calls that fail for any identifier.
    fail_first: AtomicU32,
}

impl<S: CompletionStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            broken: HashSet::new(),
            fail_first: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn broken_for(mut self, ids: impl IntoIterator<Item = TargetId>) -> Self {
        self.broken.extend(ids);
        self
    }

    #[must_use]
    pub fn failing_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: CompletionStore> CompletionStore for FlakyStore<S> {
    fn has(&self, id: TargetId) -> bool {
        self.inner.has(id)
    }

    fn mark_done(&self, id: TargetId) -> Result<()> {
        if self.broken.contains(&id) {
            bail!("injected failure for {id}");
        }
        let pending = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            bail!("injected transient failure for {id}");
        }
        self.inner.mark_done(id)
    }

    fn done_ids(&self) -> Result<HashSet<TargetId>> {
        self.inner.done_ids()
    }
}
