//! Metrics cache: one row per fetched snapshot
//!
//! The fetch pipeline writes each snapshot once and reads back the trailing
//! history for trends. SQLite (WAL mode, busy timeout) arbitrates concurrent
//! access; connections come from an r2d2 pool so no application lock is held
//! around queries.

use crate::types::{HealthStatus, MetricsSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Pool(r2d2::Error),
    Database(rusqlite::Error),
    /// Blocking task panicked or was cancelled
    Task(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Pool(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store: io error: {}", e),
            StoreError::Pool(e) => write!(f, "store: connection pool: {}", e),
            StoreError::Database(e) => write!(f, "store: database error: {}", e),
            StoreError::Task(e) => write!(f, "store: background task: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Snapshot persistence used by the fetch pipeline
///
/// Trend and notes are not persisted; snapshots read back carry empty ones.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Persist one snapshot (append-only)
    async fn save_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), StoreError>;

    /// Most recent snapshot for a product, if any
    async fn latest_snapshot(&self, product_name: &str) -> Result<Option<MetricsSnapshot>, StoreError>;

    /// All snapshots for a product with `from <= timestamp <= to`, oldest first
    async fn snapshots_in_range(
        &self,
        product_name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetricsSnapshot>, StoreError>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metrics_snapshots (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    product_name    TEXT NOT NULL,
    timestamp       INTEGER NOT NULL,
    visits          INTEGER DEFAULT 0,
    uniques         INTEGER DEFAULT 0,
    bounce_rate     REAL DEFAULT 0,
    mrr             INTEGER DEFAULT 0,
    subscribers     INTEGER DEFAULT 0,
    health_status   TEXT DEFAULT '',
    response_time   INTEGER DEFAULT 0,
    created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_metrics_product_time
    ON metrics_snapshots(product_name, timestamp DESC);
"#;

const SELECT_COLUMNS: &str = r#"
    product_name,
    timestamp,
    COALESCE(visits, 0),
    COALESCE(uniques, 0),
    COALESCE(bounce_rate, 0),
    COALESCE(mrr, 0),
    COALESCE(subscribers, 0),
    COALESCE(health_status, ''),
    COALESCE(response_time, 0)
"#;

/// SQLite implementation of `MetricsStore`
#[derive(Clone)]
pub struct SqliteMetricsStore {
    pool: DbPool,
}

impl SqliteMetricsStore {
    /// Open (or create) the cache database and apply the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.busy_timeout(Duration::from_secs(5))
        });
        let pool = Pool::builder().max_size(8).build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch(SCHEMA)?;
        }

        log::info!("📊 Metrics cache ready: {}", db_path.display());
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&*conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<MetricsSnapshot> {
    let ts: i64 = row.get(1)?;
    let health: String = row.get(7)?;
    Ok(MetricsSnapshot {
        product_name: row.get(0)?,
        timestamp: Utc.timestamp_opt(ts, 0).single().unwrap_or_default(),
        visits: row.get(2)?,
        uniques: row.get(3)?,
        bounce_rate: row.get(4)?,
        trend: Vec::new(),
        mrr: row.get(5)?,
        subscribers: row.get(6)?,
        health: HealthStatus::from_str(&health),
        latency_ms: row.get(8)?,
        notes: Vec::new(),
    })
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn save_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), StoreError> {
        let s = snapshot.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO metrics_snapshots (
                    product_name, timestamp, visits, uniques, bounce_rate,
                    mrr, subscribers, health_status, response_time
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    s.product_name,
                    s.timestamp.timestamp(),
                    s.visits,
                    s.uniques,
                    s.bounce_rate,
                    s.mrr,
                    s.subscribers,
                    s.health.as_str(),
                    s.latency_ms,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_snapshot(&self, product_name: &str) -> Result<Option<MetricsSnapshot>, StoreError> {
        let name = product_name.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM metrics_snapshots
                 WHERE product_name = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                SELECT_COLUMNS
            );
            let snapshot = conn
                .query_row(&sql, params![name], snapshot_from_row)
                .optional()?;
            Ok(snapshot)
        })
        .await
    }

    async fn snapshots_in_range(
        &self,
        product_name: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetricsSnapshot>, StoreError> {
        let name = product_name.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM metrics_snapshots
                 WHERE product_name = ?1
                   AND timestamp BETWEEN ?2 AND ?3
                 ORDER BY timestamp, id",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![name, from.timestamp(), to.timestamp()],
                snapshot_from_row,
            )?;
            let mut snapshots = Vec::new();
            for row in rows {
                snapshots.push(row?);
            }
            Ok(snapshots)
        })
        .await
    }
}
