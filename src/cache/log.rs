use super::CompletionStore;
use crate::ids::TargetId;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

struct LogState {
    file: File,
    done: HashSet<TargetId>,
}

/// Newline-delimited log of completed identifiers.
///
/// The whole log is read on open. A final line without its newline is the
/// remains of an interrupted append; it is cut off and its identifier stays
/// UNSEEN.
pub struct AppendLogStore {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl AppendLogStore {
    /// Open (creating if needed) a completion log.
    ///
    /// # Errors
    /// Returns an error if the log cannot be created, read or repaired.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("read {}", path.display()))?;

        let complete = content.rfind('\n').map_or(0, |i| i + 1);
        if complete < content.len() {
            warn!(log = %path.display(), torn = &content[complete..], "dropping torn tail of completion log");
            file.set_len(complete as u64)
                .with_context(|| format!("truncate {}", path.display()))?;
            file.sync_all()
                .with_context(|| format!("sync {}", path.display()))?;
        }

        let mut done = HashSet::new();
        for (i, line) in content[..complete].lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<TargetId>() {
                Ok(id) => {
                    done.insert(id);
                }
                Err(_) => warn!(log = %path.display(), line = i + 1, "ignoring unparsable entry"),
            }
        }
        info!(log = %path.display(), done = done.len(), "opened completion log");
        Ok(Self {
            path,
            state: Mutex::new(LogState { file, done }),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompletionStore for AppendLogStore {
    fn has(&self, id: TargetId) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.done.contains(&id)
    }

    fn mark_done(&self, id: TargetId) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.done.contains(&id) {
            return Ok(());
        }
        writeln!(state.file, "{id}").with_context(|| format!("append to {}", self.path.display()))?;
        state
            .file
            .sync_data()
            .with_context(|| format!("sync {}", self.path.display()))?;
        state.done.insert(id);
        Ok(())
    }

    fn done_ids(&self) -> Result<HashSet<TargetId>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.done.clone())
    }
}
