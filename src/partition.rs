//! Archive partitions and the optional size manifest.
//!
//! Partitions are discovered by an external collaborator (usually by scraping
//! the bulk-data listing) and handed over as plain values. The manifest is the
//! listing's content table: the byte size recorded for every archive file,
//! used to reject truncated downloads whose headers happen to agree with them.

use crate::error::ExtractError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One remote archive to scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePartition {
    /// Unique key, e.g. the publication year or a weekly file stem.
    pub key: String,
    pub source_url: String,
    #[serde(default)]
    pub expected_byte_length: Option<u64>,
}

impl ArchivePartition {
    pub fn new(key: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source_url: source_url.into(),
            expected_byte_length: None,
        }
    }

    #[must_use]
    pub const fn with_expected_length(mut self, len: u64) -> Self {
        self.expected_byte_length = Some(len);
        self
    }

    /// Last path segment of the source URL, without query string.
    #[must_use]
    pub fn file_name(&self) -> &str {
        file_name_of(&self.source_url)
    }
}

/// Last path segment of a URL, without query string or fragment.
#[must_use]
pub fn file_name_of(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Load partitions from a JSON array or a headed CSV file
/// (`key,source_url[,expected_byte_length]`), chosen by extension.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_partitions(path: impl AsRef<Path>) -> Result<Vec<ArchivePartition>> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        return serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse partitions from {}", path.display()));
    }
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<ArchivePartition>().enumerate() {
        out.push(rec.with_context(|| format!("parse CSV record #{}", i + 1))?);
    }
    Ok(out)
}

/// Reject partition lists where two entries would write the same output file.
///
/// # Errors
/// Returns [`ExtractError::InvalidInput`] naming the first duplicate key.
pub fn ensure_unique_keys(partitions: &[ArchivePartition]) -> Result<(), ExtractError> {
    let mut seen = HashSet::new();
    for p in partitions {
        if p.key.trim().is_empty() {
            return Err(ExtractError::InvalidInput(format!(
                "partition for {} has an empty key",
                p.source_url
            )));
        }
        if !seen.insert(p.key.as_str()) {
            return Err(ExtractError::InvalidInput(format!(
                "duplicate partition key {:?}",
                p.key
            )));
        }
    }
    Ok(())
}

/// Recorded archive sizes keyed by file name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    sizes: HashMap<String, u64>,
}

#[derive(Deserialize)]
struct ManifestRow {
    name: String,
    size: u64,
}

impl Manifest {
    #[must_use]
    pub fn new(sizes: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            sizes: sizes.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, size: u64) {
        self.sizes.insert(name.into(), size);
    }

    /// Recorded size for a URL, looked up by its file name.
    #[must_use]
    pub fn size_for(&self, url: &str) -> Option<u64> {
        self.sizes.get(file_name_of(url)).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Load from a JSON object (`{"name": size}`) or a headed CSV
    /// (`name,size`), chosen by extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
            let sizes: HashMap<String, u64> = serde_json::from_reader(BufReader::new(f))
                .with_context(|| format!("parse manifest {}", path.display()))?;
            return Ok(Self { sizes });
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("open {}", path.display()))?;
        let mut sizes = HashMap::new();
        for (i, row) in rdr.deserialize::<ManifestRow>().enumerate() {
            let row = row.with_context(|| format!("parse CSV record #{}", i + 1))?;
            sizes.insert(row.name, row.size);
        }
        Ok(Self { sizes })
    }
}
