//! Trait definitions for the dripfeed pipeline.
//!
//! Repository traits abstract the persistence layer so processors and the
//! ranking engine can run against in-memory fakes in tests. Backend traits
//! abstract the external services (content fetching, embedding, feedback
//! affinity).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ContentRecord, EngagementEvent, EngagementSignal, FetchedContent, NewDrop, NewEngagement,
    NewQueueItem, ProfileVector, QueueCounts, QueueItem, RunKind, RunRecord, Vector,
};

// =============================================================================
// QUEUE REPOSITORY
// =============================================================================

/// Repository for the durable ingest queue.
///
/// Status transitions go through `complete`/`fail`/`fail_permanent` only,
/// mirroring [`crate::models::QueueStatus::after_failure`]; callers never
/// write status values directly.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Add a URL to the queue in `Pending` state.
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem>;

    /// Atomically claim up to `limit` pending items, oldest first.
    ///
    /// Claimed items move to `Processing` with `tries` incremented. Two
    /// concurrent claimers never receive the same item.
    async fn claim_batch(&self, limit: i64) -> Result<Vec<QueueItem>>;

    /// Mark a claimed item as successfully processed.
    async fn complete(&self, id: Uuid) -> Result<()>;

    /// Record a failed attempt. The item returns to `Pending` while its
    /// retry budget lasts, otherwise lands in terminal `Error`. The
    /// message is kept either way.
    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    /// Record a permanent failure (malformed input): terminal `Error`
    /// regardless of remaining budget.
    async fn fail_permanent(&self, id: Uuid, error: &str) -> Result<()>;

    /// Get a queue item by ID.
    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>>;

    /// Per-status totals.
    async fn counts(&self) -> Result<QueueCounts>;

    /// Return `Processing` items older than the cutoff to `Pending`
    /// without touching `tries`. Crash recovery.
    async fn requeue_stuck(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Delete terminal-error items whose URL host matches one of the
    /// given denylisted hosts. Returns the number deleted.
    async fn purge_denylisted(&self, hosts: &[String]) -> Result<u64>;

    /// Persist a pipeline run record.
    async fn record_run(&self, run: &RunRecord) -> Result<()>;

    /// Latest run record of the given kind, if any.
    async fn last_run(&self, kind: RunKind) -> Result<Option<RunRecord>>;
}

// =============================================================================
// DROP REPOSITORY
// =============================================================================

/// Repository for content drops.
#[async_trait]
pub trait DropRepository: Send + Sync {
    /// Insert a drop, or refresh metadata on the existing row with the
    /// same `url_hash`. Returns the stored record either way.
    async fn upsert(&self, drop: NewDrop) -> Result<ContentRecord>;

    /// Get a drop by ID.
    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>>;

    /// Replace a drop's tags and set its tagging status.
    async fn set_tags(&self, id: Uuid, tags: &[String], tag_done: bool) -> Result<()>;

    /// Store (or replace) a drop's embedding.
    async fn set_embedding(&self, id: Uuid, embedding: &Vector) -> Result<()>;

    /// Drops that need (re-)embedding: those without an embedding plus
    /// those updated since `updated_since`. Oldest first, capped.
    async fn needing_embedding(
        &self,
        updated_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentRecord>>;

    /// Ranking candidate pool: fully tagged drops published since
    /// `published_since`, newest first, capped. Drops without a publish
    /// timestamp are excluded.
    async fn rankable(
        &self,
        published_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentRecord>>;
}

// =============================================================================
// ENGAGEMENT REPOSITORY
// =============================================================================

/// Repository for the append-only engagement event stream.
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    /// Record an engagement event.
    async fn record(&self, event: NewEngagement) -> Result<EngagementEvent>;

    /// A user's events since the cutoff, joined with their drop's
    /// embedding. Events on unembedded drops are excluded.
    async fn recent_signals(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<EngagementSignal>>;
}

// =============================================================================
// PROFILE REPOSITORY
// =============================================================================

/// Repository for user taste profiles and topic selections.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Get a user's profile vector, if one has been computed.
    async fn get(&self, user_id: Uuid) -> Result<Option<ProfileVector>>;

    /// Overwrite (or create) a user's profile vector.
    async fn upsert(&self, user_id: Uuid, vector: &Vector) -> Result<ProfileVector>;

    /// The user's selected topic slugs.
    async fn topic_slugs(&self, user_id: Uuid) -> Result<Vec<String>>;
}

// =============================================================================
// FETCH TRAITS
// =============================================================================

/// Backend for turning a URL into extracted content metadata.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the URL and extract title, summary, and friends.
    ///
    /// Unreachable hosts, HTTP 5xx, and timeouts surface as retryable
    /// errors; pages that exist but cannot yield a title surface as
    /// `InvalidInput`.
    async fn fetch(&self, url: &str) -> Result<FetchedContent>;
}

// =============================================================================
// EMBEDDING TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// FEEDBACK TRAITS
// =============================================================================

/// Opaque per-user/per-drop affinity score in [0,1] used by the ranking
/// engine's feedback term. Implementations may hit the database or an
/// external service; the engine treats failures and timeouts as 0.
#[async_trait]
pub trait FeedbackScorer: Send + Sync {
    /// Score the user's historical affinity for this drop.
    async fn score(&self, user_id: Uuid, drop: &ContentRecord) -> Result<f64>;
}

/// Feedback scorer that always reports no affinity. Useful for wiring
/// the ranking engine before any engagement history exists, and in tests.
pub struct NeutralFeedbackScorer;

#[async_trait]
impl FeedbackScorer for NeutralFeedbackScorer {
    async fn score(&self, _user_id: Uuid, _drop: &ContentRecord) -> Result<f64> {
        Ok(0.0)
    }
}
