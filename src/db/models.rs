//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored HTTP(S) endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The classified outcome of one probe.
///
/// Shared by [`ProbeLog`] and [`LatestStatus`], which store the same fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Seconds from request start to response headers (or failure).
    pub delay: f64,
    /// Literal HTTP status code, 0 when no response was received.
    pub status: u16,
    pub up: bool,
    pub suspended: bool,
    pub exception: Option<String>,
}

/// An immutable record of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeLog {
    pub id: i64,
    pub node_id: i64,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub created_at: DateTime<Utc>,
}

/// The most recent probe outcome for a node. One row per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestStatus {
    pub id: i64,
    pub node_id: i64,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A node together with its most recent probe logs, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithLogs {
    #[serde(flatten)]
    pub node: Node,
    pub node_logs: Vec<ProbeLog>,
}
