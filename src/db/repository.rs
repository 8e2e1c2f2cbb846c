//! Data-access contract consumed by the check engine.

use super::models::{LatestStatus, Node, ProbeLog, Verdict};
use super::store::DbError;

/// Storage operations needed to run a check cycle.
///
/// `Store` is the production implementation; tests wrap it to inject
/// failures.
pub trait Repository: Send + Sync {
    /// All nodes as of the call.
    fn list_nodes(&self) -> Result<Vec<Node>, DbError>;

    /// The current latest-status row of every node that has one.
    fn list_latest_statuses(&self) -> Result<Vec<LatestStatus>, DbError>;

    /// Append a probe log row.
    fn insert_probe_log(&self, node_id: i64, verdict: &Verdict) -> Result<ProbeLog, DbError>;

    /// Create the latest-status row for a node, overwriting any row that
    /// already exists for it.
    fn insert_latest_status(&self, node_id: i64, verdict: &Verdict)
        -> Result<LatestStatus, DbError>;

    /// Write back an existing latest-status row by id.
    fn update_latest_status(&self, status: &LatestStatus) -> Result<(), DbError>;
}
