//! Engine configuration.
//!
//! Every knob has a default that matches the bulk application corpus, so the
//! usual setup is `EngineConfig::default()` with an output directory and a
//! cache location filled in. Configurations can also be loaded from JSON;
//! missing keys fall back to their defaults.
//!
//! ```no_run
//! use ironsift::config::{CacheBackend, EngineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = EngineConfig {
//!     output_dir: "./extraction".into(),
//!     cache: CacheBackend::MarkerDir("./extraction/done".into()),
//!     ..Default::default()
//! };
//! config.validate()?;
//!
//! let from_disk = EngineConfig::from_json_file("engine.json")?;
//! # Ok(())
//! # }
//! ```

use crate::error::ExtractError;
use crate::fetch::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Where record boundaries and identifiers live in the concatenated payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayout {
    /// Element that wraps one record, e.g. `us-patent-application`.
    pub record_tag: String,
    /// Element whose text is an identifier occurrence, e.g. `doc-number`.
    pub id_tag: String,
    /// Path to the record's own identifier (first match wins).
    pub own_id_path: String,
    /// Path selecting claim elements in document order.
    pub claims_path: String,
    /// Element marking a reference to another claim.
    pub claim_ref_tag: String,
}

impl RecordLayout {
    /// Pre-grant publications (`ipa*.zip`, 2005 onward).
    #[must_use]
    pub fn us_application() -> Self {
        Self {
            record_tag: "us-patent-application".into(),
            id_tag: "doc-number".into(),
            own_id_path: "application-reference/document-id/doc-number".into(),
            claims_path: "claims/claim".into(),
            claim_ref_tag: "claim-ref".into(),
        }
    }

    /// Granted patents (`ipg*.zip`), keyed by application number.
    #[must_use]
    pub fn us_grant() -> Self {
        Self {
            record_tag: "us-patent-grant".into(),
            ..Self::us_application()
        }
    }

    /// Flat records such as `<rec><id>..</id><txt>..</txt></rec>`.
    pub fn simple(record_tag: impl Into<String>, id_tag: impl Into<String>, text_tag: impl Into<String>) -> Self {
        let id_tag = id_tag.into();
        Self {
            record_tag: record_tag.into(),
            own_id_path: id_tag.clone(),
            id_tag,
            claims_path: text_tag.into(),
            claim_ref_tag: "claim-ref".into(),
        }
    }

    fn validate(&self) -> Result<(), ExtractError> {
        let name_ok = |s: &str| !s.is_empty() && !s.contains(['<', '>', '/', ' ']);
        if !name_ok(&self.record_tag) || !name_ok(&self.id_tag) || !name_ok(&self.claim_ref_tag) {
            return Err(ExtractError::InvalidInput(format!(
                "record layout tags must be bare element names: {self:?}"
            )));
        }
        if self.own_id_path.trim_matches('/').is_empty() {
            return Err(ExtractError::InvalidInput("own_id_path is empty".into()));
        }
        Ok(())
    }
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self::us_application()
    }
}

/// Persistence backend for completed identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum CacheBackend {
    /// One empty file per completed identifier.
    MarkerDir(PathBuf),
    /// One append-only log of completed identifiers.
    AppendLog(PathBuf),
}

impl Default for CacheBackend {
    fn default() -> Self {
        Self::MarkerDir(PathBuf::from("./ironsift_done"))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Csv,
    Jsonl,
}

impl OutputFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

/// What happens to an existing partition output when its task starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Keep previous rows and append.
    #[default]
    Append,
    /// Truncate the file first.
    Fresh,
}

/// Full engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub retry: RetryPolicy,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Reject responses without a `Content-Length` header.
    pub require_content_length: bool,
    pub layout: RecordLayout,
    /// Letter count below which a claim mentioning cancellation is flagged.
    pub cancel_max_letters: usize,
    /// Keep the raw XML of each record in the output.
    pub keep_raw_xml: bool,
    pub cache: CacheBackend,
    /// Ignore completed identifiers when building each task's work list.
    pub force_reprocess: bool,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub output_format: OutputFormat,
    pub output_mode: OutputMode,
    /// Flush the writer every this many records.
    pub checkpoint_every: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            retry: RetryPolicy::default(),
            request_timeout_secs: 600,
            require_content_length: true,
            layout: RecordLayout::default(),
            cancel_max_letters: 30,
            keep_raw_xml: false,
            cache: CacheBackend::default(),
            force_reprocess: false,
            output_dir: PathBuf::from("./ironsift_output"),
            output_prefix: "extraction".into(),
            output_format: OutputFormat::default(),
            output_mode: OutputMode::default(),
            checkpoint_every: 5_000,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or fails
    /// [`EngineConfig::validate`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail deep inside a run.
    ///
    /// # Errors
    /// Returns [`ExtractError::InvalidInput`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.workers == Some(0) {
            return Err(ExtractError::InvalidInput("workers must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ExtractError::InvalidInput("retry.max_attempts must be at least 1".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(ExtractError::InvalidInput("checkpoint_every must be at least 1".into()));
        }
        if self.output_prefix.is_empty() || self.output_prefix.contains(['/', '\\']) {
            return Err(ExtractError::InvalidInput(format!(
                "output_prefix {:?} is not a plain file name prefix",
                self.output_prefix
            )));
        }
        self.layout.validate()
    }

    /// Resolved worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}
