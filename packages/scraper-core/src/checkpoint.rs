use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::types::CheckpointStatus;

/// Aggregate view of the ledger: counts grouped by status plus total.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CheckpointStats {
    pub by_status: HashMap<String, i64>,
    pub total: i64,
}

/// A single ledger row, for inspection tooling.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckpointRecord {
    pub domain: String,
    pub product_id: String,
    pub status: String,
    pub timestamp: String,
}

/// Durable per-(domain, product) outcome ledger.
///
/// Each write is a single atomic upsert keyed by the unique
/// (domain, product_id) pair; there are no cross-operation transactions.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Upsert the latest outcome for a pair (last-write-wins).
    async fn record_outcome(
        &self,
        domain: &str,
        product_id: &str,
        status: CheckpointStatus,
    ) -> Result<()>;

    /// True iff the latest status for the pair is exactly `success`.
    /// `failed` and `error` rows remain eligible for retry.
    async fn is_successfully_processed(&self, domain: &str, product_id: &str) -> Result<bool>;

    async fn statistics(&self) -> Result<CheckpointStats>;

    /// Newest rows first, for the inspection CLI.
    async fn recent(&self, limit: i64) -> Result<Vec<CheckpointRecord>>;

    /// Delete all rows, resetting state for the next run.
    async fn clear(&self) -> Result<()>;
}

/// SQLite-backed checkpoint ledger.
pub struct SqliteCheckpoints {
    pool: SqlitePool,
}

impl SqliteCheckpoints {
    /// Open (creating if missing) the ledger database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open checkpoint database {}", path.display()))?;
        Self::with_pool(pool).await
    }

    /// In-memory ledger, used by tests. A single connection keeps every
    /// query on the same database.
    ///
    /// The pool options differ from [`Self::open`] because tests run under
    /// tokio's paused clock, which jumps straight to the earliest pending
    /// timer whenever the runtime parks while the SQLite worker thread is
    /// still answering. The short acquire timeout would fire spuriously, so
    /// it is made enormous, and `max_lifetime` keeps the pool's maintenance
    /// timer as the earliest wake-up: each jump is then one maintenance
    /// period, and lifetime/idleness are measured against the real clock,
    /// so the connection is never actually reaped mid-test.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .test_before_acquire(false)
            .acquire_timeout(std::time::Duration::from_secs(365 * 24 * 3600))
            .max_lifetime(std::time::Duration::from_secs(600))
            .idle_timeout(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory checkpoint database")?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                product_id TEXT NOT NULL,
                status TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(domain, product_id)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to initialize checkpoint schema")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpoints {
    async fn record_outcome(
        &self,
        domain: &str,
        product_id: &str,
        status: CheckpointStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO checkpoints (domain, product_id, status)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(domain)
        .bind(product_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to record checkpoint")?;
        Ok(())
    }

    async fn is_successfully_processed(&self, domain: &str, product_id: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM checkpoints
            WHERE domain = ? AND product_id = ? AND status = 'success'
            "#,
        )
        .bind(domain)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query checkpoint")?;
        Ok(row.is_some())
    }

    async fn statistics(&self) -> Result<CheckpointStats> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count FROM checkpoints GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read checkpoint statistics")?;

        let mut stats = CheckpointStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            stats.total += count;
            stats.by_status.insert(status, count);
        }
        Ok(stats)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<CheckpointRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT domain, product_id, status, timestamp
            FROM checkpoints
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read recent checkpoints")?;

        Ok(rows
            .into_iter()
            .map(|row| CheckpointRecord {
                domain: row.get("domain"),
                product_id: row.get("product_id"),
                status: row.get("status"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints")
            .execute(&self.pool)
            .await
            .context("Failed to clear checkpoint ledger")?;
        Ok(())
    }
}
