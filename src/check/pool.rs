//! Fixed-size worker pool that drains one cycle's node queue.

use serde::Serialize;
use std::num::NonZeroUsize;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use super::classify::{classify, SuspensionMarkers};
use super::persist::{persist, StatusSnapshot};
use crate::db::{Node, Repository};
use crate::probe::HttpProber;

/// Everything a worker needs to process a node during one cycle.
pub struct CycleContext {
    pub repo: Arc<dyn Repository>,
    pub prober: HttpProber,
    pub markers: SuspensionMarkers,
    pub request_timeout: Duration,
    pub snapshot: StatusSnapshot,
}

/// Tally of one check cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub checked: usize,
    pub up: usize,
    pub down: usize,
    pub suspended: usize,
    pub persist_failures: usize,
}

impl AddAssign for CheckSummary {
    fn add_assign(&mut self, other: Self) {
        self.checked += other.checked;
        self.up += other.up;
        self.down += other.down;
        self.suspended += other.suspended;
        self.persist_failures += other.persist_failures;
    }
}

/// Probe, classify and persist every node using exactly `max_workers`
/// workers. Returns once every node has been processed.
pub async fn run_check(
    nodes: Vec<Node>,
    max_workers: NonZeroUsize,
    ctx: Arc<CycleContext>,
) -> CheckSummary {
    let (tx, rx) = mpsc::channel::<Node>(nodes.len().max(1));
    for node in nodes {
        if tx.send(node).await.is_err() {
            break;
        }
    }
    drop(tx);

    let rx = Arc::new(Mutex::new(rx));
    let mut workers = JoinSet::new();
    for _ in 0..max_workers.get() {
        workers.spawn(run_worker(rx.clone(), ctx.clone()));
    }

    let mut summary = CheckSummary::default();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(tally) => summary += tally,
            Err(e) => tracing::error!("Check worker exited abnormally: {}", e),
        }
    }
    summary
}

async fn run_worker(rx: Arc<Mutex<mpsc::Receiver<Node>>>, ctx: Arc<CycleContext>) -> CheckSummary {
    let mut tally = CheckSummary::default();
    loop {
        let next = rx.lock().await.recv().await;
        let Some(node) = next else { break };
        tally += check_node(&node, &ctx).await;
    }
    tally
}

async fn check_node(node: &Node, ctx: &CycleContext) -> CheckSummary {
    let outcome = ctx.prober.probe(&node.url, ctx.request_timeout).await;
    let verdict = classify(&outcome, &ctx.markers, ctx.request_timeout);

    let mut tally = CheckSummary {
        checked: 1,
        ..Default::default()
    };
    if verdict.up {
        tally.up = 1;
    } else {
        tally.down = 1;
    }
    if verdict.suspended {
        tally.suspended = 1;
    }

    if let Err(e) = persist(ctx.repo.as_ref(), node.id, &verdict, &ctx.snapshot) {
        tracing::error!("Error persisting result for {}: {}", node.url, e);
        tally.persist_failures = 1;
    }

    tracing::info!(
        "Checked: {} | Status: {} | Up: {} | Suspended: {} | Delay: {:.2}s",
        node.url,
        verdict.status,
        verdict.up,
        verdict.suspended,
        verdict.delay
    );

    tally
}
