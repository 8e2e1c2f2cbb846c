//! Turns raw probe outcomes into verdicts.

use std::time::Duration;

use crate::db::Verdict;
use crate::probe::{ProbeError, RawOutcome};

/// Default markers that flag a hosting provider's suspension page.
pub const DEFAULT_SUSPENSION_MARKERS: &[&str] =
    &["suspended", "account suspended", "سایت مسدود است", "مسدود"];

/// Case-insensitive substrings that mark a response body as a suspension page.
#[derive(Debug, Clone, PartialEq)]
pub struct SuspensionMarkers {
    markers: Vec<String>,
}

impl SuspensionMarkers {
    /// Build a marker list, lower-casing each entry and dropping blanks.
    /// Order is kept; the first match wins.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for marker in markers {
            let marker = marker.as_ref().trim().to_lowercase();
            if !marker.is_empty() && !list.contains(&marker) {
                list.push(marker);
            }
        }
        Self { markers: list }
    }

    /// The first marker found in `body`, if any.
    pub fn find(&self, body: &[u8]) -> Option<&str> {
        let body = String::from_utf8_lossy(body).to_lowercase();
        self.markers
            .iter()
            .find(|m| body.contains(m.as_str()))
            .map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.markers
    }
}

impl Default for SuspensionMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_SUSPENSION_MARKERS)
    }
}

/// Classify a raw probe outcome.
///
/// Timeouts record exactly `request_timeout` as the delay so timed-out probes
/// compare equal regardless of scheduling jitter.
pub fn classify(
    outcome: &RawOutcome,
    markers: &SuspensionMarkers,
    request_timeout: Duration,
) -> Verdict {
    match outcome {
        RawOutcome::Failed { error, elapsed } => {
            let delay = match error {
                ProbeError::Timeout(_) => request_timeout,
                _ => *elapsed,
            };
            Verdict {
                delay: delay.as_secs_f64(),
                status: 0,
                up: false,
                suspended: false,
                exception: Some(error.to_string()),
            }
        }
        RawOutcome::Response {
            status,
            body,
            elapsed,
        } => Verdict {
            delay: elapsed.as_secs_f64(),
            status: *status,
            up: (200..300).contains(status),
            suspended: body
                .as_deref()
                .map(|b| markers.find(b).is_some())
                .unwrap_or(false),
            exception: None,
        },
    }
}
