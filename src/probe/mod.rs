//! Probe module for endpoint monitoring.
//!
//! A probe is a single bounded GET against a node URL. Every failure is
//! reported as a [`RawOutcome`] value so one bad endpoint never disturbs the
//! rest of a check cycle.

mod http;

pub use http::*;

use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("context deadline exceeded after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// What came back from one probe, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    /// The server answered with a status line.
    Response {
        status: u16,
        /// `None` when the body could not be read within the body timeout.
        body: Option<Vec<u8>>,
        elapsed: Duration,
    },
    /// No response was received.
    Failed { error: ProbeError, elapsed: Duration },
}

/// Parse a node URL, accepting only absolute http and https URLs.
pub fn parse_target_url(raw: &str) -> Result<Url, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::InvalidUrl("url cannot be empty".to_string()));
    }

    let url = Url::parse(trimmed).map_err(|e| ProbeError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(ProbeError::InvalidUrl(format!("{}: missing host", raw))),
        other => Err(ProbeError::InvalidUrl(format!(
            "{}: unsupported scheme {}",
            raw, other
        ))),
    }
}
