//! Error taxonomy for the extraction engine.
//!
//! Plumbing code returns [`anyhow::Result`] with context attached, the same way
//! the I/O modules do. The variants here are the conditions callers and the
//! scheduler actually branch on; each one is handled at the narrowest scope and
//! never unwinds past a partition task.

use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum ExtractError {
    /// The fetch was rejected or failed on every attempt.
    #[error("fetch of {url} failed after {attempts} attempts: {reason}")]
    TransientNetwork {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// A candidate span has no parsable own-identifier field.
    #[error("malformed record in partition {partition} ({sub_file}) at offset {offset}: {reason}")]
    MalformedRecord {
        partition: String,
        sub_file: String,
        offset: usize,
        reason: String,
    },

    /// An optional field could not be read; the field was defaulted.
    #[error("field {field} of record {id} defaulted: {reason}")]
    FieldExtraction {
        id: u64,
        field: &'static str,
        reason: String,
    },

    /// Persisting a DONE marker failed after retries.
    #[error("could not mark {id} done: {reason}")]
    CacheWrite { id: u64, reason: String },

    /// Bad configuration, identifiers or partition lists.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ExtractError {
    /// Whether a later run may succeed where this one did not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. } | Self::CacheWrite { .. })
    }
}
