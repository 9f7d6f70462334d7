//! Content drop repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use dripfeed_core::{
    new_v7, ContentRecord, DropRepository, DropType, Error, NewDrop, Result,
};

/// Columns selected for a full [`ContentRecord`].
const DROP_COLUMNS: &str = "id, url, url_hash, title, summary, image_url, content_type::text, \
     tags, tag_done, source_id, sponsored, published_at, \
     authority_score, quality_score, popularity_score, embedding, created_at, updated_at";

/// PostgreSQL implementation of DropRepository.
pub struct PgDropRepository {
    pool: Pool<Postgres>,
}

impl PgDropRepository {
    /// Create a new PgDropRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert string from database to DropType.
    fn str_to_drop_type(s: &str) -> DropType {
        match s {
            "video" => DropType::Video,
            _ => DropType::Article,
        }
    }

    /// Parse a content_drop row into a ContentRecord.
    fn parse_drop_row(row: sqlx::postgres::PgRow) -> ContentRecord {
        ContentRecord {
            id: row.get("id"),
            url: row.get("url"),
            url_hash: row.get("url_hash"),
            title: row.get("title"),
            summary: row.get("summary"),
            image_url: row.get("image_url"),
            content_type: Self::str_to_drop_type(row.get("content_type")),
            tags: row.get("tags"),
            tag_done: row.get("tag_done"),
            source_id: row.get("source_id"),
            sponsored: row.get("sponsored"),
            published_at: row.get("published_at"),
            authority_score: row.get("authority_score"),
            quality_score: row.get("quality_score"),
            popularity_score: row.get("popularity_score"),
            embedding: row.get("embedding"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl DropRepository for PgDropRepository {
    async fn upsert(&self, drop: NewDrop) -> Result<ContentRecord> {
        let id = new_v7();
        let now = Utc::now();

        // url_hash is the dedup key. A re-fetch of a known URL refreshes
        // the fetched metadata and bumps updated_at, which re-qualifies
        // the row for the trailing re-embed window. Tags, scores, and the
        // stored embedding are owned by other flows and stay untouched.
        let query = format!(
            "INSERT INTO content_drop
                 (id, url, url_hash, title, summary, image_url, content_type,
                  source_id, published_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7::drop_type, $8, $9, $10, $10)
             ON CONFLICT (url_hash) DO UPDATE SET
                 url = EXCLUDED.url,
                 title = EXCLUDED.title,
                 summary = EXCLUDED.summary,
                 image_url = EXCLUDED.image_url,
                 content_type = EXCLUDED.content_type,
                 source_id = COALESCE(EXCLUDED.source_id, content_drop.source_id),
                 published_at = COALESCE(EXCLUDED.published_at, content_drop.published_at),
                 updated_at = EXCLUDED.updated_at
             RETURNING {DROP_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(id)
            .bind(&drop.url)
            .bind(&drop.url_hash)
            .bind(&drop.title)
            .bind(&drop.summary)
            .bind(&drop.image_url)
            .bind(drop.content_type.as_str())
            .bind(drop.source_id)
            .bind(drop.published_at)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(Self::parse_drop_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>> {
        let query = format!("SELECT {DROP_COLUMNS} FROM content_drop WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_drop_row))
    }

    async fn set_tags(&self, id: Uuid, tags: &[String], tag_done: bool) -> Result<()> {
        let now = Utc::now();

        // Tags feed the embedding text, so this bumps updated_at and the
        // trailing window picks the drop up for re-embedding.
        let result = sqlx::query(
            "UPDATE content_drop
             SET tags = $1, tag_done = $2, updated_at = $3
             WHERE id = $4",
        )
        .bind(tags)
        .bind(tag_done)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DropNotFound(id));
        }
        Ok(())
    }

    async fn set_embedding(&self, id: Uuid, embedding: &Vector) -> Result<()> {
        let now = Utc::now();

        // embedded_at records vector freshness; updated_at stays put so
        // storing a vector never re-qualifies the row it just served.
        let result = sqlx::query(
            "UPDATE content_drop
             SET embedding = $1::vector, embedded_at = $2
             WHERE id = $3",
        )
        .bind(embedding)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DropNotFound(id));
        }
        Ok(())
    }

    async fn needing_embedding(
        &self,
        updated_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentRecord>> {
        // Never-embedded rows always qualify. Inside the trailing window a
        // row qualifies only while its embedding is older than its last
        // edit, so an unchanged corpus yields an empty selection.
        let query = format!(
            "SELECT {DROP_COLUMNS} FROM content_drop
             WHERE embedding IS NULL
                OR (updated_at > $1 AND (embedded_at IS NULL OR embedded_at < updated_at))
             ORDER BY updated_at ASC
             LIMIT $2"
        );

        let rows = sqlx::query(&query)
            .bind(updated_since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_drop_row).collect())
    }

    async fn rankable(
        &self,
        published_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentRecord>> {
        let query = format!(
            "SELECT {DROP_COLUMNS} FROM content_drop
             WHERE embedding IS NOT NULL
               AND tag_done = TRUE
               AND published_at IS NOT NULL
               AND published_at >= $1
             ORDER BY published_at DESC
             LIMIT $2"
        );

        let rows = sqlx::query(&query)
            .bind(published_since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_drop_row).collect())
    }
}
