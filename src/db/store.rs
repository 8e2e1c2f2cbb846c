//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqlResult, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use super::repository::Repository;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Enable foreign keys and apply pending migrations.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Round-trip a trivial query to confirm the database is usable.
    pub fn ping(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
        Ok(())
    }

    // --- Nodes ---

    /// Add a new node. Fails with `Conflict` if the URL is already monitored.
    pub fn add_node(&self, url: &str) -> Result<Node, DbError> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO nodes (url, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![url, format_db_time(now)],
        )
        .map_err(|e| conflict_or(e, url))?;
        Ok(Node {
            id: conn.last_insert_rowid(),
            url: url.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get all nodes ordered by id.
    pub fn get_nodes(&self) -> Result<Vec<Node>, DbError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, url, created_at, updated_at FROM nodes ORDER BY id ASC")?;
        let nodes = stmt
            .query_map([], node_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(nodes)
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: i64) -> Result<Node, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, url, created_at, updated_at FROM nodes WHERE id = ?1",
            params![id],
            node_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Change a node's URL.
    pub fn update_node(&self, id: i64, url: &str) -> Result<Node, DbError> {
        {
            let conn = self.conn()?;
            let changed = conn
                .execute(
                    "UPDATE nodes SET url = ?1, updated_at = ?2 WHERE id = ?3",
                    params![url, format_db_time(Utc::now()), id],
                )
                .map_err(|e| conflict_or(e, url))?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
        }
        self.get_node(id)
    }

    /// Delete a node together with its logs and latest status.
    pub fn delete_node(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM node_logs WHERE node_id = ?1", params![id])?;
        tx.execute("DELETE FROM histories WHERE node_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        tx.commit()?;
        Ok(())
    }

    // --- Probe logs ---

    /// Append a probe log row.
    pub fn add_probe_log(&self, node_id: i64, verdict: &Verdict) -> Result<ProbeLog, DbError> {
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO node_logs (node_id, delay, status, up, suspended, exception, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                node_id,
                verdict.delay,
                verdict.status,
                verdict.up,
                verdict.suspended,
                verdict.exception,
                format_db_time(now),
            ],
        )?;
        Ok(ProbeLog {
            id: conn.last_insert_rowid(),
            node_id,
            verdict: verdict.clone(),
            created_at: now,
        })
    }

    /// Most recent probe logs across all nodes, newest first.
    pub fn get_probe_logs(&self, limit: i64) -> Result<Vec<ProbeLog>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, node_id, delay, status, up, suspended, exception, created_at
             FROM node_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let logs = stmt
            .query_map(params![limit], probe_log_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// Most recent probe logs of one node, newest first.
    pub fn get_node_probe_logs(&self, node_id: i64, limit: i64) -> Result<Vec<ProbeLog>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, node_id, delay, status, up, suspended, exception, created_at
             FROM node_logs WHERE node_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let logs = stmt
            .query_map(params![node_id, limit], probe_log_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// Every node with up to `limit` of its most recent probe logs.
    pub fn get_nodes_with_logs(&self, limit: i64) -> Result<Vec<NodeWithLogs>, DbError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, url, created_at, updated_at FROM nodes ORDER BY id ASC")?;
        let nodes = stmt
            .query_map([], node_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, node_id, delay, status, up, suspended, exception, created_at
             FROM (
                 SELECT *, ROW_NUMBER() OVER (PARTITION BY node_id ORDER BY id DESC) AS rn
                 FROM node_logs
             )
             WHERE rn <= ?1
             ORDER BY node_id, id DESC",
        )?;
        let mut by_node: HashMap<i64, Vec<ProbeLog>> = HashMap::new();
        for log in stmt.query_map(params![limit], probe_log_from_row)? {
            let log = log?;
            by_node.entry(log.node_id).or_default().push(log);
        }

        Ok(nodes
            .into_iter()
            .map(|node| NodeWithLogs {
                node_logs: by_node.remove(&node.id).unwrap_or_default(),
                node,
            })
            .collect())
    }

    /// Get a probe log by ID.
    pub fn get_probe_log(&self, id: i64) -> Result<ProbeLog, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, node_id, delay, status, up, suspended, exception, created_at
             FROM node_logs WHERE id = ?1",
            params![id],
            probe_log_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Count probe logs, optionally restricted to one node.
    #[cfg(test)]
    pub fn count_probe_logs(&self, node_id: Option<i64>) -> Result<i64, DbError> {
        let conn = self.conn()?;
        let count = match node_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(*) FROM node_logs WHERE node_id = ?1",
                params![id],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM node_logs", [], |r| r.get(0))?,
        };
        Ok(count)
    }

    /// Delete probe logs created before a cutoff. Returns the number removed.
    pub fn delete_probe_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM node_logs WHERE created_at < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(deleted)
    }

    // --- Latest statuses ---

    /// Get every latest-status row.
    pub fn get_latest_statuses(&self) -> Result<Vec<LatestStatus>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, node_id, delay, status, up, suspended, exception, created_at, updated_at
             FROM histories ORDER BY id ASC",
        )?;
        let statuses = stmt
            .query_map([], latest_status_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(statuses)
    }

    /// Get a latest-status row by ID.
    pub fn get_latest_status(&self, id: i64) -> Result<LatestStatus, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, node_id, delay, status, up, suspended, exception, created_at, updated_at
             FROM histories WHERE id = ?1",
            params![id],
            latest_status_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Insert the latest status for a node, or overwrite it if one exists.
    pub fn upsert_latest_status(
        &self,
        node_id: i64,
        verdict: &Verdict,
    ) -> Result<LatestStatus, DbError> {
        let now = Utc::now();
        let conn = self.conn()?;
        let (id, created_at): (i64, DateTime<Utc>) = conn.query_row(
            "INSERT INTO histories (node_id, delay, status, up, suspended, exception, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(node_id) DO UPDATE SET
             delay=excluded.delay, status=excluded.status, up=excluded.up,
             suspended=excluded.suspended, exception=excluded.exception, updated_at=excluded.updated_at
             RETURNING id, created_at",
            params![
                node_id,
                verdict.delay,
                verdict.status,
                verdict.up,
                verdict.suspended,
                verdict.exception,
                format_db_time(now),
            ],
            |row| Ok((row.get(0)?, time_column(row, 1)?)),
        )?;
        Ok(LatestStatus {
            id,
            node_id,
            verdict: verdict.clone(),
            created_at,
            updated_at: now,
        })
    }

    /// Overwrite the fields of an existing latest-status row.
    pub fn update_latest_status(&self, status: &LatestStatus) -> Result<(), DbError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE histories SET delay=?1, status=?2, up=?3, suspended=?4, exception=?5, updated_at=?6
             WHERE id = ?7",
            params![
                status.verdict.delay,
                status.verdict.status,
                status.verdict.up,
                status.verdict.suspended,
                status.verdict.exception,
                format_db_time(status.updated_at),
                status.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

impl Repository for Store {
    fn list_nodes(&self) -> Result<Vec<Node>, DbError> {
        self.get_nodes()
    }

    fn list_latest_statuses(&self) -> Result<Vec<LatestStatus>, DbError> {
        self.get_latest_statuses()
    }

    fn insert_probe_log(&self, node_id: i64, verdict: &Verdict) -> Result<ProbeLog, DbError> {
        self.add_probe_log(node_id, verdict)
    }

    fn insert_latest_status(
        &self,
        node_id: i64,
        verdict: &Verdict,
    ) -> Result<LatestStatus, DbError> {
        self.upsert_latest_status(node_id, verdict)
    }

    fn update_latest_status(&self, status: &LatestStatus) -> Result<(), DbError> {
        Store::update_latest_status(self, status)
    }
}

fn conflict_or(e: rusqlite::Error, url: &str) -> DbError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => {
            DbError::Conflict(format!("url already exists: {}", url))
        }
        _ => DbError::Sqlite(e),
    }
}

fn node_from_row(row: &Row<'_>) -> SqlResult<Node> {
    Ok(Node {
        id: row.get(0)?,
        url: row.get(1)?,
        created_at: time_column(row, 2)?,
        updated_at: time_column(row, 3)?,
    })
}

fn verdict_from_row(row: &Row<'_>) -> SqlResult<Verdict> {
    Ok(Verdict {
        delay: row.get(2)?,
        status: row.get(3)?,
        up: row.get(4)?,
        suspended: row.get(5)?,
        exception: row.get(6)?,
    })
}

fn probe_log_from_row(row: &Row<'_>) -> SqlResult<ProbeLog> {
    Ok(ProbeLog {
        id: row.get(0)?,
        node_id: row.get(1)?,
        verdict: verdict_from_row(row)?,
        created_at: time_column(row, 7)?,
    })
}

fn latest_status_from_row(row: &Row<'_>) -> SqlResult<LatestStatus> {
    Ok(LatestStatus {
        id: row.get(0)?,
        node_id: row.get(1)?,
        verdict: verdict_from_row(row)?,
        created_at: time_column(row, 7)?,
        updated_at: time_column(row, 8)?,
    })
}

fn time_column(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_db_time(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized timestamp {:?}", s).into(),
        )
    })
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    fn verdict(status: u16) -> Verdict {
        Verdict {
            delay: 0.25,
            status,
            up: (200..300).contains(&status),
            suspended: false,
            exception: None,
        }
    }

    #[test]
    fn test_node_crud() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        let node = store.add_node("https://example.com").unwrap();
        assert!(node.id > 0);

        let fetched = store.get_node(node.id).unwrap();
        assert_eq!(fetched.url, "https://example.com");

        let updated = store.update_node(node.id, "https://example.org").unwrap();
        assert_eq!(updated.url, "https://example.org");

        store.delete_node(node.id).unwrap();
        assert!(matches!(store.get_node(node.id), Err(DbError::NotFound)));
        assert!(matches!(store.delete_node(node.id), Err(DbError::NotFound)));
    }

    #[test]
    fn test_duplicate_url_is_conflict() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        store.add_node("https://example.com").unwrap();
        let err = store.add_node("https://example.com").unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn test_upsert_keeps_one_row_per_node() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let node = store.add_node("https://example.com").unwrap();

        let first = store.upsert_latest_status(node.id, &verdict(200)).unwrap();
        let second = store.upsert_latest_status(node.id, &verdict(503)).unwrap();
        assert_eq!(first.id, second.id);

        let all = store.get_latest_statuses().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].verdict.status, 503);
        assert!(!all[0].verdict.up);
    }

    #[test]
    fn test_update_latest_status_in_place() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let node = store.add_node("https://example.com").unwrap();

        let mut status = store.upsert_latest_status(node.id, &verdict(200)).unwrap();
        status.verdict = Verdict {
            delay: 5.0,
            status: 0,
            up: false,
            suspended: false,
            exception: Some("deadline exceeded".to_string()),
        };
        store.update_latest_status(&status).unwrap();

        let fetched = store.get_latest_status(status.id).unwrap();
        assert_eq!(fetched.verdict, status.verdict);
    }

    #[test]
    fn test_delete_node_removes_logs_and_status() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let node = store.add_node("https://example.com").unwrap();

        store.add_probe_log(node.id, &verdict(200)).unwrap();
        store.add_probe_log(node.id, &verdict(200)).unwrap();
        store.upsert_latest_status(node.id, &verdict(200)).unwrap();

        store.delete_node(node.id).unwrap();
        assert_eq!(store.count_probe_logs(None).unwrap(), 0);
        assert!(store.get_latest_statuses().unwrap().is_empty());
    }

    #[test]
    fn test_probe_log_for_unknown_node_fails() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        assert!(store.add_probe_log(42, &verdict(200)).is_err());
    }

    #[test]
    fn test_nodes_with_logs_caps_each_node() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let busy = store.add_node("https://example.com").unwrap();
        let quiet = store.add_node("https://example.org").unwrap();

        for status in [200, 500, 503] {
            store.add_probe_log(busy.id, &verdict(status)).unwrap();
        }

        let all = store.get_nodes_with_logs(2).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].node.id, busy.id);
        let statuses: Vec<u16> = all[0].node_logs.iter().map(|l| l.verdict.status).collect();
        assert_eq!(statuses, vec![503, 500]);
        assert_eq!(all[1].node.id, quiet.id);
        assert!(all[1].node_logs.is_empty());
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let node = store.add_node("https://example.com").unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE nodes SET created_at = 'yesterday' WHERE id = ?1",
                params![node.id],
            )
            .unwrap();

        assert!(matches!(store.get_node(node.id), Err(DbError::Sqlite(_))));
        assert!(store.get_nodes().is_err());
    }

    #[test]
    fn test_delete_probe_logs_before() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let node = store.add_node("https://example.com").unwrap();

        let log = store.add_probe_log(node.id, &verdict(200)).unwrap();
        assert_eq!(store.get_probe_log(log.id).unwrap().verdict.status, 200);

        let removed = store
            .delete_probe_logs_before(Utc::now() - ChronoDuration::hours(1))
            .unwrap();
        assert_eq!(removed, 0);

        let removed = store
            .delete_probe_logs_before(Utc::now() + ChronoDuration::seconds(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_node_probe_logs(node.id, 10).unwrap().is_empty());
    }
}
