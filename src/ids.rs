//! Canonical target identifiers and the read-only target set.
//!
//! Identifiers arrive from upstream datasets in many spellings: zero-padded
//! (`"0000123"`), float-formatted by spreadsheet tooling (`"123.0"`), or with
//! stray whitespace. All of them collapse to one non-negative integer before any
//! comparison happens.

use crate::error::ExtractError;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Canonical record identifier.
pub type TargetId = u64;

/// Canonicalize one raw identifier.
///
/// Leading zeros are dropped, a trailing `.0…` fraction is tolerated, anything
/// else non-numeric is rejected.
///
/// # Errors
/// Returns [`ExtractError::InvalidInput`] for empty, signed, fractional or
/// non-numeric input.
pub fn canonicalize(raw: &str) -> Result<TargetId, ExtractError> {
    let trimmed = raw.trim();
    let digits = match trimmed.split_once('.') {
        Some((int, frac)) if !frac.is_empty() && frac.bytes().all(|b| b == b'0') => int,
        Some(_) => return Err(ExtractError::InvalidInput(format!("not an integer id: {raw:?}"))),
        None => trimmed,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ExtractError::InvalidInput(format!("not an integer id: {raw:?}")));
    }
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() {
        return Ok(0);
    }
    stripped
        .parse::<TargetId>()
        .map_err(|e| ExtractError::InvalidInput(format!("id {raw:?} out of range: {e}")))
}

/// Read-only set of identifiers requested by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetSet {
    ids: HashSet<TargetId>,
}

impl TargetSet {
    #[must_use]
    pub fn new(ids: impl IntoIterator<Item = TargetId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Build from raw strings, skipping (and logging) those that do not
    /// canonicalize. Returns the set and the number of rejected inputs.
    pub fn from_raw<I, S>(raw: I) -> (Self, usize)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids = HashSet::new();
        let mut rejected = 0usize;
        for value in raw {
            let value = value.as_ref();
            if value.trim().is_empty() {
                continue;
            }
            match canonicalize(value) {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(err) => {
                    rejected += 1;
                    warn!(%err, "skipping target identifier");
                }
            }
        }
        (Self { ids }, rejected)
    }

    /// Load one identifier per line.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub fn from_lines_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut lines = Vec::new();
        for (i, line) in BufReader::new(f).lines().enumerate() {
            lines.push(line.with_context(|| format!("read line {} in {}", i + 1, path.display()))?);
        }
        let (set, rejected) = Self::from_raw(lines);
        info!(path = %path.display(), ids = set.len(), rejected, "loaded target identifiers");
        Ok(set)
    }

    /// Load identifiers from one named column of a headed CSV file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or has no such column.
    pub fn from_csv_column(path: impl AsRef<Path>, column: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("open {}", path.display()))?;
        let idx = rdr
            .headers()
            .with_context(|| format!("read header of {}", path.display()))?
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| {
                ExtractError::InvalidInput(format!("no column {column:?} in {}", path.display()))
            })?;
        let mut raw = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.with_context(|| format!("parse CSV record #{}", i + 1))?;
            if let Some(v) = rec.get(idx) {
                raw.push(v.to_string());
            }
        }
        let (set, rejected) = Self::from_raw(raw);
        info!(path = %path.display(), ids = set.len(), rejected, "loaded target identifiers");
        Ok(set)
    }

    #[must_use]
    pub fn contains(&self, id: TargetId) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<TargetId> for TargetSet {
    fn from_iter<T: IntoIterator<Item = TargetId>>(iter: T) -> Self {
        Self::new(iter)
    }
}
