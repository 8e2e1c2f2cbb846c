//! Retention manager for cleaning up old probe logs.

use crate::db::Store;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// Manager for deleting probe logs past their retention age.
pub struct RetentionManager {
    store: Arc<Store>,
    retention: Duration,
    interval: Duration,
    stop: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the retention manager background task.
    pub async fn start(&self) {
        let (tx, mut rx) = broadcast::channel(1);
        {
            let mut stop_guard = self.stop.lock().await;
            *stop_guard = Some(tx);
        }

        let store = self.store.clone();
        let retention = self.retention;
        let mut interval = tokio::time::interval(self.interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        process_retention(&store, retention);
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }
}

/// Delete probe logs older than `retention`. Returns the number removed.
pub fn process_retention(store: &Store, retention: Duration) -> usize {
    let retention = match ChronoDuration::from_std(retention) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("RetentionManager: Invalid retention {:?}: {}", retention, e);
            return 0;
        }
    };
    let cutoff = Utc::now() - retention;

    match store.delete_probe_logs_before(cutoff) {
        Ok(0) => 0,
        Ok(n) => {
            tracing::info!("RetentionManager: Deleted {} probe logs older than {}", n, cutoff);
            n
        }
        Err(e) => {
            tracing::error!("RetentionManager: Failed to delete old probe logs: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Verdict;
    use tempfile::NamedTempFile;

    #[test]
    fn test_process_retention_keeps_recent_logs_and_statuses() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let node = store.add_node("https://example.com").unwrap();
        let verdict = Verdict {
            delay: 0.1,
            status: 200,
            up: true,
            suspended: false,
            exception: None,
        };
        store.add_probe_log(node.id, &verdict).unwrap();
        store.upsert_latest_status(node.id, &verdict).unwrap();

        assert_eq!(process_retention(&store, Duration::from_secs(3600)), 0);
        assert_eq!(store.count_probe_logs(None).unwrap(), 1);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(process_retention(&store, Duration::from_millis(5)), 1);
        assert_eq!(store.count_probe_logs(None).unwrap(), 0);
        assert_eq!(store.get_latest_statuses().unwrap().len(), 1);
    }
}
