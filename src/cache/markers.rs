use super::CompletionStore;
use crate::ids::TargetId;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, create_dir_all, read_dir, rename};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

const MARKER_EXT: &str = "done";

/// One `{id}.done` file per completed identifier.
pub struct MarkerDirStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl MarkerDirStore {
    /// Open (creating if needed) a marker directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, id: TargetId) -> PathBuf {
        self.dir.join(format!("{id}.{MARKER_EXT}"))
    }
}

impl CompletionStore for MarkerDirStore {
    fn has(&self, id: TargetId) -> bool {
        self.marker_path(id).exists()
    }

    fn mark_done(&self, id: TargetId) -> Result<()> {
        let target = self.marker_path(id);
        if target.exists() {
            return Ok(());
        }
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{id}.{}.{seq}.tmp", std::process::id()));
        let f = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.sync_all()
            .with_context(|| format!("sync {}", tmp.display()))?;
        rename(&tmp, &target)
            .with_context(|| format!("rename {} -> {}", tmp.display(), target.display()))?;
        sync_dir(&self.dir)
    }

    fn done_ids(&self) -> Result<HashSet<TargetId>> {
        let mut out = HashSet::new();
        for entry in read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))? {
            let entry = entry.with_context(|| format!("read {}", self.dir.display()))?;
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(MARKER_EXT))
                .and_then(|n| n.strip_suffix('.'))
            else {
                continue;
            };
            match stem.parse::<TargetId>() {
                Ok(id) => {
                    out.insert(id);
                }
                Err(_) => warn!(dir = %self.dir.display(), file = stem, "ignoring foreign marker"),
            }
        }
        Ok(out)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("sync {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
