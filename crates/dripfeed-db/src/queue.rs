//! Ingest queue repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use dripfeed_core::{
    new_v7, Error, NewQueueItem, QueueCounts, QueueItem, QueueRepository, QueueStatus, Result,
    RunKind, RunRecord,
};

/// PostgreSQL implementation of QueueRepository.
///
/// Status transitions are written only through `complete`, `fail`, and
/// `fail_permanent`, which mirror [`QueueStatus::after_failure`] in SQL.
pub struct PgQueueRepository {
    pool: Pool<Postgres>,
}

impl PgQueueRepository {
    /// Create a new PgQueueRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert string from database to QueueStatus.
    fn str_to_status(s: &str) -> QueueStatus {
        match s {
            "pending" => QueueStatus::Pending,
            "processing" => QueueStatus::Processing,
            "done" => QueueStatus::Done,
            "error" => QueueStatus::Error,
            _ => QueueStatus::Pending, // fallback
        }
    }

    /// Convert string from database to RunKind.
    fn str_to_run_kind(s: &str) -> RunKind {
        match s {
            "embed" => RunKind::Embed,
            _ => RunKind::Ingest,
        }
    }

    /// Parse a queue row into a QueueItem.
    fn parse_item_row(row: sqlx::postgres::PgRow) -> QueueItem {
        QueueItem {
            id: row.get("id"),
            url: row.get("url"),
            status: Self::str_to_status(row.get("status")),
            tries: row.get("tries"),
            error: row.get("error"),
            source_id: row.get("source_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Parse a pipeline_run row into a RunRecord.
    fn parse_run_row(row: sqlx::postgres::PgRow) -> RunRecord {
        RunRecord {
            id: row.get("id"),
            kind: Self::str_to_run_kind(row.get("kind")),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            processed: row.get("processed"),
            succeeded: row.get("succeeded"),
            failed: row.get("failed"),
            error: row.get("error"),
        }
    }
}

#[async_trait]
impl QueueRepository for PgQueueRepository {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem> {
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO ingest_queue (id, url, status, tries, source_id, created_at, updated_at)
             VALUES ($1, $2, 'pending'::queue_status, 0, $3, $4, $4)
             RETURNING id, url, status::text, tries, error, source_id, created_at, updated_at",
        )
        .bind(id)
        .bind(&item.url)
        .bind(item.source_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_item_row(row))
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<QueueItem>> {
        let now = Utc::now();

        // FOR UPDATE SKIP LOCKED keeps concurrent claimers disjoint: a row
        // locked by one claimer is invisible to the others instead of
        // blocking them. The try counter increments here, in the same
        // statement as the status flip, so every claim costs one attempt.
        let rows = sqlx::query(
            "UPDATE ingest_queue
             SET status = 'processing'::queue_status, tries = tries + 1, updated_at = $1
             WHERE id IN (
                 SELECT id FROM ingest_queue
                 WHERE status = 'pending'::queue_status
                 ORDER BY created_at ASC
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, url, status::text, tries, error, source_id, created_at, updated_at",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut items: Vec<QueueItem> = rows.into_iter().map(Self::parse_item_row).collect();
        // RETURNING order is unspecified; keep claim order stable for callers.
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE ingest_queue
             SET status = 'done'::queue_status, error = NULL, updated_at = $1
             WHERE id = $2",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::QueueItemNotFound(id));
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let tries: Option<i32> = sqlx::query_scalar("SELECT tries FROM ingest_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let tries = tries.ok_or(Error::QueueItemNotFound(id))?;

        match QueueStatus::after_failure(tries, false) {
            QueueStatus::Pending => {
                // Budget remains: back to pending with the message kept.
                sqlx::query(
                    "UPDATE ingest_queue
                     SET status = 'pending'::queue_status, error = $1, updated_at = $2
                     WHERE id = $3",
                )
                .bind(error)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
            _ => {
                sqlx::query(
                    "UPDATE ingest_queue
                     SET status = 'error'::queue_status, error = $1, updated_at = $2
                     WHERE id = $3",
                )
                .bind(error)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn fail_permanent(&self, id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE ingest_queue
             SET status = 'error'::queue_status, error = $1, updated_at = $2
             WHERE id = $3",
        )
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::QueueItemNotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>> {
        let row = sqlx::query(
            "SELECT id, url, status::text, tries, error, source_id, created_at, updated_at
             FROM ingest_queue WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_item_row))
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'pending'::queue_status) AS pending,
                 COUNT(*) FILTER (WHERE status = 'processing'::queue_status) AS processing,
                 COUNT(*) FILTER (WHERE status = 'done'::queue_status) AS done,
                 COUNT(*) FILTER (WHERE status = 'error'::queue_status) AS error
             FROM ingest_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueCounts {
            pending: row.get("pending"),
            processing: row.get("processing"),
            done: row.get("done"),
            error: row.get("error"),
        })
    }

    async fn requeue_stuck(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let now = Utc::now();

        // tries stays untouched: the claim that orphaned the item already
        // charged its attempt.
        let result = sqlx::query(
            "UPDATE ingest_queue
             SET status = 'pending'::queue_status, updated_at = $1
             WHERE status = 'processing'::queue_status AND updated_at < $2",
        )
        .bind(now)
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn purge_denylisted(&self, hosts: &[String]) -> Result<u64> {
        if hosts.is_empty() {
            return Ok(0);
        }

        // Host comparison covers exact matches and subdomains. Only
        // terminal-error items are eligible; live items stay queued even
        // on a denylisted host until their budget runs out.
        let result = sqlx::query(
            "DELETE FROM ingest_queue
             WHERE status = 'error'::queue_status
               AND EXISTS (
                   SELECT 1 FROM unnest($1::text[]) AS denied(host)
                   WHERE split_part(split_part(split_part(url, '://', 2), '/', 1), ':', 1) = denied.host
                      OR split_part(split_part(split_part(url, '://', 2), '/', 1), ':', 1)
                           LIKE '%.' || denied.host
               )",
        )
        .bind(hosts)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn record_run(&self, run: &RunRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_run (id, kind, started_at, finished_at, processed, succeeded, failed, error)
             VALUES ($1, $2::run_kind, $3, $4, $5, $6, $7, $8)",
        )
        .bind(run.id)
        .bind(run.kind.as_str())
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.processed)
        .bind(run.succeeded)
        .bind(run.failed)
        .bind(&run.error)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn last_run(&self, kind: RunKind) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            "SELECT id, kind::text, started_at, finished_at, processed, succeeded, failed, error
             FROM pipeline_run
             WHERE kind = $1::run_kind
             ORDER BY finished_at DESC
             LIMIT 1",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_run_row))
    }
}
