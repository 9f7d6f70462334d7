//! Core data models for the dripfeed pipeline.
//!
//! These types are shared across all dripfeed crates and represent
//! the core domain entities: queued URLs, content drops, engagement
//! events, profile vectors, and ranked feed candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// QUEUE TYPES
// =============================================================================

/// Status of an item in the ingest queue.
///
/// Lifecycle: `Pending -> Processing -> Done`, or back to `Pending` while
/// the retry budget lasts, or `Error` once it is exhausted (or the input
/// turned out to be malformed). `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl QueueStatus {
    /// Database/string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Error => "error",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Done | QueueStatus::Error)
    }

    /// Where a `Processing` item lands when its attempt fails.
    ///
    /// `tries` is the attempt counter as incremented at claim time, so an
    /// item on its final allowed attempt arrives here with
    /// `tries == QUEUE_MAX_TRIES`. Permanent failures (malformed input)
    /// skip the retry budget entirely.
    pub fn after_failure(tries: i32, permanent: bool) -> QueueStatus {
        if permanent || tries >= defaults::QUEUE_MAX_TRIES {
            QueueStatus::Error
        } else {
            QueueStatus::Pending
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A URL waiting in (or finished with) the ingest queue.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueItem {
    pub id: Uuid,
    pub url: String,
    pub status: QueueStatus,
    /// Number of processing attempts so far (incremented at claim).
    pub tries: i32,
    /// Last failure message, kept for observability across retries.
    pub error: Option<String>,
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to enqueue a URL for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NewQueueItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
}

/// Per-status totals for the ingest queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub error: i64,
}

impl QueueCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.done + self.error
    }
}

/// Outcome of one queue processing batch.
///
/// `processed` counts every claimed item; `succeeded + failed == processed`.
/// Failures here include both retry-bound and terminal ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BatchOutcome {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Outcome of one embedding backlog run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EmbedOutcome {
    /// Drops selected for embedding this run.
    pub scanned: usize,
    /// Drops whose embedding was stored.
    pub embedded: usize,
    /// Backend batches that failed and were skipped.
    pub failed_batches: usize,
}

// =============================================================================
// CONTENT TYPES
// =============================================================================

/// Kind of content behind a drop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DropType {
    #[default]
    Article,
    Video,
}

impl DropType {
    pub fn as_str(self) -> &'static str {
        match self {
            DropType::Article => "article",
            DropType::Video => "video",
        }
    }
}

impl std::fmt::Display for DropType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized content record ("drop").
///
/// One row per unique normalized URL (`url_hash` is the dedup key).
/// Carries the embedding and the source-derived scores the ranking
/// engine consumes, so it deliberately does not serialize; API
/// responses use [`DropSummary`] instead.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub id: Uuid,
    /// Normalized URL.
    pub url: String,
    /// Hex SHA-256 of the normalized URL.
    pub url_hash: String,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub content_type: DropType,
    pub tags: Vec<String>,
    /// Whether the external tagging service has finished with this drop.
    pub tag_done: bool,
    pub source_id: Option<Uuid>,
    pub sponsored: bool,
    pub published_at: Option<DateTime<Utc>>,
    /// Source authority in [0,1], when known.
    pub authority_score: Option<f64>,
    /// Editorial quality in [0,1], when known.
    pub quality_score: Option<f64>,
    /// Raw engagement count, unbounded.
    pub popularity_score: Option<f64>,
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Text fed to the embedding backend for this drop.
    ///
    /// Deterministic assembly: title, then summary, then the tag list,
    /// single-space separated. Unchanged inputs always produce the same
    /// text, which keeps re-embedding idempotent.
    pub fn embedding_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.summary.len() + self.tags.iter().map(|t| t.len() + 1).sum::<usize>() + 2,
        );
        text.push_str(&self.title);
        text.push(' ');
        text.push_str(&self.summary);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text
    }
}

/// Fields for inserting (or refreshing) a drop after a fetch.
#[derive(Debug, Clone)]
pub struct NewDrop {
    pub url: String,
    pub url_hash: String,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub content_type: DropType,
    pub source_id: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
}

/// API-facing view of a drop (no embedding payload).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DropSummary {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub content_type: DropType,
    pub tags: Vec<String>,
    pub tag_done: bool,
    pub source_id: Option<Uuid>,
    pub sponsored: bool,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&ContentRecord> for DropSummary {
    fn from(record: &ContentRecord) -> Self {
        DropSummary {
            id: record.id,
            url: record.url.clone(),
            title: record.title.clone(),
            summary: record.summary.clone(),
            image_url: record.image_url.clone(),
            content_type: record.content_type,
            tags: record.tags.clone(),
            tag_done: record.tag_done,
            source_id: record.source_id,
            sponsored: record.sponsored,
            published_at: record.published_at,
        }
    }
}

/// What a fetcher extracted from a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedContent {
    /// Canonical URL advertised by the page, if any.
    pub canonical_url: Option<String>,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub content_type: DropType,
    pub published_at: Option<DateTime<Utc>>,
}

// =============================================================================
// ENGAGEMENT TYPES
// =============================================================================

/// User action on a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngagementAction {
    Like,
    Save,
    Open,
    Dismiss,
    Dislike,
}

impl EngagementAction {
    pub fn as_str(self) -> &'static str {
        match self {
            EngagementAction::Like => "like",
            EngagementAction::Save => "save",
            EngagementAction::Open => "open",
            EngagementAction::Dismiss => "dismiss",
            EngagementAction::Dislike => "dislike",
        }
    }

    /// Base signal weight before time decay.
    ///
    /// Positive actions pull the profile toward the content, negative
    /// ones push away. Magnitudes reflect intent strength: an explicit
    /// like or dislike outweighs a passive open.
    pub fn weight(self) -> f64 {
        match self {
            EngagementAction::Like => 3.0,
            EngagementAction::Save => 2.0,
            EngagementAction::Open => 1.0,
            EngagementAction::Dismiss => -2.0,
            EngagementAction::Dislike => -3.0,
        }
    }
}

impl std::fmt::Display for EngagementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded engagement event. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EngagementEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub drop_id: Uuid,
    pub action: EngagementAction,
    pub created_at: DateTime<Utc>,
}

/// Request to record an engagement event.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NewEngagement {
    pub user_id: Uuid,
    pub drop_id: Uuid,
    pub action: EngagementAction,
}

/// One engagement joined with its drop's embedding, as consumed by the
/// profile vectorizer. Events on drops without embeddings never reach
/// this type.
#[derive(Debug, Clone)]
pub struct EngagementSignal {
    pub action: EngagementAction,
    pub created_at: DateTime<Utc>,
    pub embedding: Vector,
}

// =============================================================================
// PROFILE TYPES
// =============================================================================

/// A user's taste vector. Unit length by construction; refreshes
/// overwrite the whole row.
#[derive(Debug, Clone)]
pub struct ProfileVector {
    pub user_id: Uuid,
    pub vector: Vector,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// RANKING TYPES
// =============================================================================

/// One entry of a ranked feed. Ephemeral: computed per request, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RankedCandidate {
    pub drop_id: Uuid,
    pub final_score: f64,
    /// Human-readable explanations, at most two.
    pub reason_tags: Vec<String>,
}

// =============================================================================
// PIPELINE RUN TYPES
// =============================================================================

/// Which pipeline stage a run record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Ingest,
    Embed,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Ingest => "ingest",
            RunKind::Embed => "embed",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted record of one processor/embedder run. Written only by the
/// stage that ran; health checks read the latest per kind instead of
/// any in-process "last run" state.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RunRecord {
    pub id: Uuid,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub error: Option<String>,
}
