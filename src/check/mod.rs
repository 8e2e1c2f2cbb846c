//! Uptime check engine.
//!
//! A cycle loads every node and the current latest-status snapshot, then
//! hands the nodes to a fixed-size worker pool that probes, classifies and
//! persists each one.

mod classify;
mod persist;
mod pool;

pub use classify::*;
pub use persist::*;
pub use pool::*;

use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::db::{DbError, Repository};
use crate::probe::{HttpProber, ProbeError};

/// Check cycle error types.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("failed to load nodes: {0}")]
    LoadNodes(#[source] DbError),
    #[error("failed to load latest statuses: {0}")]
    LoadStatuses(#[source] DbError),
}

/// Tunables for a check cycle.
#[derive(Debug, Clone)]
pub struct CheckSettings {
    pub max_workers: NonZeroUsize,
    pub request_timeout: Duration,
    pub body_timeout: Duration,
    pub markers: SuspensionMarkers,
}

/// How a call to [`Checker::run_once`] ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CheckSummary),
    NoNodes,
    /// Another cycle was still running.
    Skipped,
}

/// Runs check cycles, at most one at a time.
pub struct Checker {
    repo: Arc<dyn Repository>,
    prober: HttpProber,
    settings: CheckSettings,
    running: Semaphore,
}

impl Checker {
    pub fn new(repo: Arc<dyn Repository>, settings: CheckSettings) -> Result<Self, ProbeError> {
        let prober = HttpProber::new(settings.body_timeout)?;
        Ok(Self {
            repo,
            prober,
            settings,
            running: Semaphore::new(1),
        })
    }

    /// Run one full check cycle now.
    ///
    /// Returns `Skipped` without touching storage if a cycle is already in
    /// flight.
    pub async fn run_once(&self) -> Result<CycleOutcome, CheckError> {
        let _permit = match self.running.try_acquire() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("Skipping uptime check: previous cycle still running");
                return Ok(CycleOutcome::Skipped);
            }
        };

        let nodes = self.repo.list_nodes().map_err(CheckError::LoadNodes)?;
        if nodes.is_empty() {
            tracing::info!("No nodes found");
            return Ok(CycleOutcome::NoNodes);
        }

        let statuses = self
            .repo
            .list_latest_statuses()
            .map_err(CheckError::LoadStatuses)?;

        let snapshot = StatusSnapshot::new(statuses);
        tracing::debug!(
            "Starting uptime check of {} nodes ({} with a known status) using {} workers",
            nodes.len(),
            snapshot.len(),
            self.settings.max_workers
        );

        let ctx = Arc::new(CycleContext {
            repo: self.repo.clone(),
            prober: self.prober.clone(),
            markers: self.settings.markers.clone(),
            request_timeout: self.settings.request_timeout,
            snapshot,
        });

        let summary = run_check(nodes, self.settings.max_workers, ctx).await;
        tracing::info!(
            "Uptime check completed: {} checked, {} up, {} down, {} suspended, {} persist failures",
            summary.checked,
            summary.up,
            summary.down,
            summary.suspended,
            summary.persist_failures
        );
        Ok(CycleOutcome::Completed(summary))
    }
}
