//! SQL-backed feedback scorer.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use dripfeed_core::{ContentRecord, Error, FeedbackScorer, Result};

/// Feedback scorer backed by the `user_drop_affinity` SQL function.
///
/// The function looks at the user's recent positive engagements and
/// returns the share that hit the same source or overlapping tags,
/// scaled to [0,1]. Callers treat this as an opaque affinity; the
/// ranking engine clamps and defaults on failure, so this type does
/// not need to.
pub struct PgFeedbackScorer {
    pool: Pool<Postgres>,
}

impl PgFeedbackScorer {
    /// Create a new PgFeedbackScorer with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedbackScorer for PgFeedbackScorer {
    async fn score(&self, user_id: Uuid, drop: &ContentRecord) -> Result<f64> {
        let score: f64 =
            sqlx::query_scalar("SELECT user_drop_affinity($1, $2, $3, $4)")
                .bind(user_id)
                .bind(drop.id)
                .bind(drop.source_id)
                .bind(&drop.tags)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(score)
    }
}
