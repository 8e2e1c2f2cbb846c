//! Writes probe verdicts back to storage.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::db::{DbError, LatestStatus, Repository, Verdict};

/// Node id → latest status, loaded once per cycle and shared by all workers.
///
/// The lock is only held for map access, never across storage calls.
#[derive(Debug, Default)]
pub struct StatusSnapshot {
    entries: Mutex<HashMap<i64, LatestStatus>>,
}

impl StatusSnapshot {
    pub fn new(statuses: Vec<LatestStatus>) -> Self {
        let entries = statuses.into_iter().map(|s| (s.node_id, s)).collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, LatestStatus>> {
        // Entries are plain data, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `verdict` to the node's cached entry and return the updated row,
    /// or `None` when the node has no entry yet.
    fn apply(&self, node_id: i64, verdict: &Verdict) -> Option<LatestStatus> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&node_id)?;
        entry.verdict = verdict.clone();
        entry.updated_at = Utc::now();
        Some(entry.clone())
    }

    fn insert(&self, status: LatestStatus) {
        self.lock().insert(status.node_id, status);
    }

    #[cfg(test)]
    pub fn get(&self, node_id: i64) -> Option<LatestStatus> {
        self.lock().get(&node_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Record one probe: append a log row, then upsert the node's latest status.
///
/// Both writes are attempted; the first failure is returned.
pub fn persist(
    repo: &dyn Repository,
    node_id: i64,
    verdict: &Verdict,
    snapshot: &StatusSnapshot,
) -> Result<(), DbError> {
    let logged = repo.insert_probe_log(node_id, verdict).map(|_| ());

    let upserted = match snapshot.apply(node_id, verdict) {
        Some(status) => repo.update_latest_status(&status),
        None => repo
            .insert_latest_status(node_id, verdict)
            .map(|status| snapshot.insert(status)),
    };

    logged.and(upserted)
}
