//! Centralized default constants for the dripfeed pipeline.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates and the HTTP server should reference these constants instead of
//! defining their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// QUEUE
// =============================================================================

/// Maximum processing attempts per queue item before it is parked in the
/// terminal error state. The counter increments at claim time, so the
/// fifth failed attempt is the last.
pub const QUEUE_MAX_TRIES: i32 = 5;

/// Default number of items claimed per processing batch.
pub const QUEUE_BATCH_LIMIT: i64 = 25;

/// Age after which a `processing` item is considered orphaned by a crashed
/// worker and eligible for requeue (15 minutes; well past any fetch timeout).
pub const QUEUE_STUCK_AFTER_SECS: u64 = 900;

// =============================================================================
// FETCHING
// =============================================================================

/// Default concurrent fetches per batch.
pub const FETCH_CONCURRENCY: usize = 4;

/// Lower bound for configured fetch concurrency.
pub const FETCH_CONCURRENCY_MIN: usize = 3;

/// Upper bound for configured fetch concurrency.
pub const FETCH_CONCURRENCY_MAX: usize = 5;

/// Per-item fetch timeout in seconds. Applies to the whole fetch including
/// redirects and body read.
pub const FETCH_TIMEOUT_SECS: u64 = 15;

/// Maximum redirects followed per fetch.
pub const FETCH_MAX_REDIRECTS: usize = 5;

/// Maximum response body bytes read per fetch (2 MiB). Metadata lives in
/// the document head; anything larger is truncated, not rejected.
pub const FETCH_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Maximum extracted title length in characters.
pub const FETCH_TITLE_MAX_CHARS: usize = 300;

/// Maximum extracted summary length in characters.
pub const FETCH_SUMMARY_MAX_CHARS: usize = 500;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Maximum texts per embedding backend call.
pub const EMBED_BATCH_MAX: usize = 100;

/// Pause between consecutive embedding batches in milliseconds, so a large
/// backlog run does not monopolize the backend.
pub const EMBED_BATCH_PAUSE_MS: u64 = 200;

/// Maximum drops selected per backlog run.
pub const EMBED_BACKLOG_LIMIT: i64 = 500;

/// Trailing window in days for re-embedding recently updated drops. Edits
/// inside this window get fresh vectors even though one already exists.
pub const EMBED_RECENT_WINDOW_DAYS: i64 = 7;

// =============================================================================
// PROFILE VECTORIZATION
// =============================================================================

/// Engagement lookback window in days.
pub const PROFILE_WINDOW_DAYS: i64 = 90;

/// Exponential decay constant in days: a signal loses ~63% of its weight
/// after this many days (`exp(-age_days / PROFILE_DECAY_DAYS)`).
pub const PROFILE_DECAY_DAYS: f64 = 21.0;

/// Signals whose decayed absolute weight falls below this are dropped.
pub const PROFILE_MIN_WEIGHT: f64 = 0.01;

// =============================================================================
// RANKING
// =============================================================================

/// Candidate pool publication window in days.
pub const RANK_POOL_WINDOW_DAYS: i64 = 30;

/// Maximum candidates pulled into one ranking pass.
pub const RANK_POOL_SIZE: i64 = 200;

/// Recency half-life in hours: a drop this old scores 0.5 on recency.
pub const RECENCY_HALF_LIFE_HOURS: f64 = 48.0;

/// Raw popularity count that saturates the popularity score at 1.0
/// (log-scaled: `ln(1 + raw) / ln(POPULARITY_LOG_CEILING)`).
pub const POPULARITY_LOG_CEILING: f64 = 1000.0;

/// Trust score used when a source carries no authority/quality data.
pub const TRUST_DEFAULT: f64 = 0.5;

/// Base score weight for recency.
pub const BASE_WEIGHT_RECENCY: f64 = 0.30;

/// Base score weight for source trust.
pub const BASE_WEIGHT_TRUST: f64 = 0.25;

/// Base score weight for popularity.
pub const BASE_WEIGHT_POPULARITY: f64 = 0.15;

/// Personalization weight for topic match.
pub const PERSONAL_WEIGHT_TOPIC: f64 = 0.20;

/// Personalization weight for profile/embedding similarity.
pub const PERSONAL_WEIGHT_SIMILARITY: f64 = 0.25;

/// Personalization weight for the feedback affinity term.
pub const PERSONAL_WEIGHT_FEEDBACK: f64 = 0.25;

/// Blend weight of the base score in the final score.
pub const FINAL_WEIGHT_BASE: f64 = 0.4;

/// Blend weight of the personalization score in the final score.
pub const FINAL_WEIGHT_PERSONAL: f64 = 0.6;

/// Drops published within this many hours earn the "Fresh content" reason.
pub const FRESH_WINDOW_HOURS: i64 = 24;

/// Trust score above which the "High quality source" reason applies.
pub const TRUST_REASON_THRESHOLD: f64 = 0.7;

/// Feedback score above which the "liked before" reason applies.
pub const FEEDBACK_REASON_THRESHOLD: f64 = 0.1;

/// Maximum reason tags attached to a ranked candidate.
pub const REASON_TAG_MAX: usize = 2;

/// Maximum accepted candidates per source in one feed.
pub const RANK_SOURCE_CAP: usize = 2;

/// Maximum sponsored candidates per feed.
pub const RANK_SPONSORED_CAP: usize = 1;

/// Concurrent feedback scorer lookups per ranking pass.
pub const FEEDBACK_CONCURRENCY: usize = 4;

/// Per-lookup feedback scorer timeout in milliseconds. Ranking never
/// waits on a slow scorer; the term degrades to 0.
pub const FEEDBACK_TIMEOUT_MS: u64 = 750;

/// Default feed length.
pub const FEED_LIMIT_DEFAULT: i64 = 20;

/// Hard cap on requested feed length.
pub const FEED_LIMIT_MAX: i64 = 50;

// =============================================================================
// WORKER
// =============================================================================

/// Default worker poll interval in milliseconds.
pub const WORKER_POLL_INTERVAL_MS: u64 = 5_000;

/// The worker runs the embedding backlog every Nth poll.
pub const WORKER_EMBED_EVERY: u32 = 6;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum request body size in bytes (1 MiB; the API carries URLs and
/// small JSON payloads only).
pub const MAX_BODY_SIZE_BYTES: usize = 1024 * 1024;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;
