//! Verified, bounded-retry download of one partition archive.
//!
//! A response is accepted only when all of these hold:
//! - the status is 2xx,
//! - the body length equals the advertised `Content-Length`
//!   (a missing header counts as a mismatch unless relaxed),
//! - the body length equals the expected size, when one is known from the
//!   partition itself or from the [`Manifest`].
//!
//! Anything else is retried up to [`RetryPolicy::max_attempts`] times, after
//! which the fetch resolves to [`FetchOutcome::Exhausted`]. Exhaustion is a
//! normal outcome, not an error: the caller skips the partition for this run.

pub mod retry;
pub mod transport;

pub use retry::{RetryExhausted, RetryPolicy, retry_with_backoff};
pub use transport::{HttpResponse, Transport, UreqTransport};

use crate::partition::Manifest;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(Vec<u8>),
    Exhausted { attempts: u32, last_error: String },
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    manifest: Option<Manifest>,
    require_content_length: bool,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            manifest: None,
            require_content_length: true,
        }
    }

    #[must_use]
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    #[must_use]
    pub const fn require_content_length(mut self, required: bool) -> Self {
        self.require_content_length = required;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `url`, verifying it against `expected_len` or the manifest.
    pub fn fetch(&self, url: &str, expected_len: Option<u64>) -> FetchOutcome {
        let expected = expected_len.or_else(|| self.manifest.as_ref().and_then(|m| m.size_for(url)));
        let result = retry_with_backoff(&self.policy, |attempt| {
            let response = self.transport.get(url).map_err(|e| format!("transport error: {e}"))?;
            debug!(url, attempt, status = response.status, bytes = response.body.len(), "fetch attempt");
            self.verify(&response, expected)?;
            Ok::<_, String>(response.body)
        });
        match result {
            Ok(body) => {
                info!(url, bytes = body.len(), "fetched archive");
                FetchOutcome::Fetched(body)
            }
            Err(RetryExhausted { attempts, last_error }) => {
                warn!(url, attempts, error = %last_error, "fetch exhausted");
                FetchOutcome::Exhausted { attempts, last_error }
            }
        }
    }

    fn verify(&self, response: &HttpResponse, expected: Option<u64>) -> Result<(), String> {
        if !response.is_success() {
            return Err(format!("status {}", response.status));
        }
        let got = response.body.len() as u64;
        match response.content_length {
            Some(advertised) if advertised != got => {
                return Err(format!("length {got} != content-length {advertised}"));
            }
            None if self.require_content_length => {
                return Err("missing content-length header".to_string());
            }
            _ => {}
        }
        if let Some(expected) = expected
            && expected != got
        {
            return Err(format!("length {got} != expected {expected}"));
        }
        Ok(())
    }
}
