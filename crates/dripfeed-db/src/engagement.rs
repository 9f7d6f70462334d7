//! Engagement event repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use dripfeed_core::{
    new_v7, EngagementAction, EngagementEvent, EngagementRepository, EngagementSignal, Error,
    NewEngagement, Result,
};

/// PostgreSQL implementation of EngagementRepository.
///
/// The event table is append-only; nothing here updates or deletes.
pub struct PgEngagementRepository {
    pool: Pool<Postgres>,
}

impl PgEngagementRepository {
    /// Create a new PgEngagementRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert string from database to EngagementAction.
    fn str_to_action(s: &str) -> EngagementAction {
        match s {
            "like" => EngagementAction::Like,
            "save" => EngagementAction::Save,
            "dismiss" => EngagementAction::Dismiss,
            "dislike" => EngagementAction::Dislike,
            _ => EngagementAction::Open, // fallback
        }
    }
}

#[async_trait]
impl EngagementRepository for PgEngagementRepository {
    async fn record(&self, event: NewEngagement) -> Result<EngagementEvent> {
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO engagement_event (id, user_id, drop_id, action, created_at)
             VALUES ($1, $2, $3, $4::engagement_action, $5)
             RETURNING id, user_id, drop_id, action::text, created_at",
        )
        .bind(id)
        .bind(event.user_id)
        .bind(event.drop_id)
        .bind(event.action.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(EngagementEvent {
            id: row.get("id"),
            user_id: row.get("user_id"),
            drop_id: row.get("drop_id"),
            action: Self::str_to_action(row.get("action")),
            created_at: row.get("created_at"),
        })
    }

    async fn recent_signals(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<EngagementSignal>> {
        // Events on drops without a stored embedding carry no usable
        // signal and are filtered here rather than in the vectorizer.
        let rows = sqlx::query(
            "SELECT e.action::text AS action, e.created_at, d.embedding
             FROM engagement_event e
             JOIN content_drop d ON d.id = e.drop_id
             WHERE e.user_id = $1
               AND e.created_at >= $2
               AND d.embedding IS NOT NULL
             ORDER BY e.created_at DESC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let signals = rows
            .into_iter()
            .map(|row| EngagementSignal {
                action: Self::str_to_action(row.get("action")),
                created_at: row.get("created_at"),
                embedding: row.get("embedding"),
            })
            .collect();

        Ok(signals)
    }
}
