//! HTTP probe implementation.

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use super::{parse_target_url, ProbeError, RawOutcome};

/// Issues probes over a shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    body_timeout: Duration,
}

impl HttpProber {
    /// Create a prober whose body reads are bounded by `body_timeout`.
    pub fn new(body_timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self {
            client,
            body_timeout,
        })
    }

    /// Run one GET against `url`, bounded by `timeout` up to the response
    /// headers.
    ///
    /// The recorded elapsed time stops when headers arrive. The body is then
    /// read under the separate body timeout; a failed read is logged and
    /// reported as `body: None`.
    pub async fn probe(&self, url: &str, timeout: Duration) -> RawOutcome {
        let url = match parse_target_url(url) {
            Ok(u) => u,
            Err(error) => {
                return RawOutcome::Failed {
                    error,
                    elapsed: Duration::ZERO,
                }
            }
        };

        let start = Instant::now();
        let sent = tokio::time::timeout(timeout, self.client.get(url.clone()).send()).await;
        let elapsed = start.elapsed();

        let response = match sent {
            Err(_) => {
                return RawOutcome::Failed {
                    error: ProbeError::Timeout(timeout),
                    elapsed,
                }
            }
            Ok(Err(e)) if e.is_timeout() => {
                return RawOutcome::Failed {
                    error: ProbeError::Timeout(timeout),
                    elapsed,
                }
            }
            Ok(Err(e)) => {
                return RawOutcome::Failed {
                    error: ProbeError::Network(error_chain(&e)),
                    elapsed,
                }
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status().as_u16();
        let body = match tokio::time::timeout(self.body_timeout, response.bytes()).await {
            Ok(Ok(bytes)) => Some(bytes.to_vec()),
            Ok(Err(e)) => {
                tracing::warn!("Error reading response body for {}: {}", url, error_chain(&e));
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Timed out reading response body for {} after {:?}",
                    url,
                    self.body_timeout
                );
                None
            }
        };

        RawOutcome::Response {
            status,
            body,
            elapsed,
        }
    }
}

/// Render an error and all of its sources on one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = cause.source();
    }
    msg
}
