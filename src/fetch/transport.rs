//! Blocking HTTP transport.
//!
//! The fetcher only needs status, the advertised length and the body bytes, so
//! the seam is a single blocking `get`. Each worker blocks on its own request;
//! parallelism comes from running several workers, not from multiplexing.

use std::io::Read;
use std::time::Duration;

/// The parts of an HTTP response the fetcher verifies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `Content-Length` header, if present and numeric.
    pub content_length: Option<u64>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Blocking GET returning the whole body.
pub trait Transport: Send + Sync {
    /// Perform one request. Transport-level failures (DNS, reset, timeout)
    /// are returned as `Err`; HTTP error statuses are returned as `Ok`.
    ///
    /// # Errors
    /// Returns a description of the transport failure.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;
}

/// [`Transport`] backed by a shared `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        let response = self.agent.get(url).call().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let content_length = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let mut body = Vec::with_capacity(content_length.map_or(0, |n| n.min(1 << 30) as usize));
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| format!("read body: {e}"))?;
        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}
