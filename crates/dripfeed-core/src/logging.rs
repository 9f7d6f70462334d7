//! Structured logging schema and field name constants for dripfeed.
//!
//! All crates use these constants for consistent structured logging fields.
//! This ensures log aggregation tools (Loki, Elasticsearch) can query by
//! standardized field names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Operation failed and was not recovered, requires operator attention |
//! | WARN  | Recoverable issue: retry scheduled, batch skipped, term degraded |
//! | INFO  | Lifecycle events (startup, shutdown), batch/run completions |
//! | DEBUG | Per-item decisions, intermediate values, config choices |
//! | TRACE | High-volume data (per-candidate scores, extraction fields) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → batch → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "server", "ingest", "rank", "db", "fetch", "embed"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "processor", "embedder", "vectorizer", "engine", "pool", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "process_batch", "claim_batch", "embed_texts", "rank"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Queue item UUID being processed.
pub const QUEUE_ITEM_ID: &str = "queue_item_id";

/// Content drop UUID being operated on.
pub const DROP_ID: &str = "drop_id";

/// User UUID for profile/ranking operations.
pub const USER_ID: &str = "user_id";

/// Host part of the URL being fetched.
pub const URL_HOST: &str = "url_host";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Items in the current batch (claimed, embedded, ranked).
pub const BATCH_SIZE: &str = "batch_size";

/// Number of results returned by a query or ranking pass.
pub const RESULT_COUNT: &str = "result_count";

/// Number of input texts sent to the embedding backend.
pub const INPUT_COUNT: &str = "input_count";

/// Number of processing attempts for a queue item.
pub const TRIES: &str = "tries";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

// ─── Backend fields ────────────────────────────────────────────────────────

/// Model name used for embedding.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
