//! Scheduler module for periodic check cycles and log retention.

mod retention;

pub use retention::*;

use crate::check::{Checker, CycleOutcome};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};

/// Triggers a check cycle on a fixed interval.
///
/// Overlap is resolved by [`Checker::run_once`], which skips a tick while the
/// previous cycle is still in flight.
pub struct Scheduler {
    checker: Arc<Checker>,
    interval: Duration,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(checker: Arc<Checker>, interval: Duration) -> Self {
        Self {
            checker,
            interval,
            stop: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        }
    }

    /// Start the background ticker. The first cycle runs immediately.
    pub async fn start(&self) {
        let (tx, rx) = broadcast::channel(1);
        {
            let mut stop = self.stop.lock().await;
            *stop = Some(tx);
        }

        tracing::info!("Scheduler: checking nodes every {:?}", self.interval);
        let handle = tokio::spawn(run_check_loop(self.checker.clone(), self.interval, rx));
        *self.task.lock().await = Some(handle);
    }

    /// Stop the background ticker and wait for a cycle already in flight to
    /// finish.
    pub async fn stop(&self) {
        {
            let stop = self.stop.lock().await;
            if let Some(tx) = stop.as_ref() {
                let _ = tx.send(());
            }
        }

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Scheduler task failed: {}", e);
            }
        }
    }
}

async fn run_check_loop(
    checker: Arc<Checker>,
    interval: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut cycles = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                let checker = checker.clone();
                cycles.spawn(async move {
                    run_cycle(&checker).await;
                });
            }
            Some(_) = cycles.join_next(), if !cycles.is_empty() => {}
        }
    }

    if !cycles.is_empty() {
        tracing::info!("Scheduler: waiting for the running check to finish");
    }
    while cycles.join_next().await.is_some() {}

    tracing::info!("Scheduler: stopped");
}

/// Run one cycle and log how it ended.
async fn run_cycle(checker: &Checker) {
    match checker.run_once().await {
        Ok(CycleOutcome::Completed(_)) => {}
        Ok(CycleOutcome::NoNodes) => tracing::debug!("Scheduler: no nodes to check"),
        Ok(CycleOutcome::Skipped) => tracing::debug!("Scheduler: tick skipped"),
        Err(e) => tracing::error!("Uptime check aborted: {}", e),
    }
}
