//! Profile vector repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use dripfeed_core::{Error, ProfileRepository, ProfileVector, Result};

/// PostgreSQL implementation of ProfileRepository.
pub struct PgProfileRepository {
    pool: Pool<Postgres>,
}

impl PgProfileRepository {
    /// Create a new PgProfileRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn get(&self, user_id: Uuid) -> Result<Option<ProfileVector>> {
        let row = sqlx::query(
            "SELECT user_id, vector, updated_at FROM profile_vector WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| ProfileVector {
            user_id: row.get("user_id"),
            vector: row.get("vector"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn upsert(&self, user_id: Uuid, vector: &Vector) -> Result<ProfileVector> {
        let now = Utc::now();

        // Whole-row overwrite; profile refreshes always recompute from
        // scratch so there is nothing to merge.
        let row = sqlx::query(
            "INSERT INTO profile_vector (user_id, vector, updated_at)
             VALUES ($1, $2::vector, $3)
             ON CONFLICT (user_id) DO UPDATE SET
                 vector = EXCLUDED.vector,
                 updated_at = EXCLUDED.updated_at
             RETURNING user_id, vector, updated_at",
        )
        .bind(user_id)
        .bind(vector)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ProfileVector {
            user_id: row.get("user_id"),
            vector: row.get("vector"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn topic_slugs(&self, user_id: Uuid) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT slug FROM user_topic WHERE user_id = $1 ORDER BY slug ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(|row| row.get("slug")).collect())
    }
}
