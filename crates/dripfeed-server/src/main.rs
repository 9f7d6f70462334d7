//! dripfeed-server - HTTP API server for the dripfeed pipeline

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use uuid::Uuid;

use dripfeed_core::defaults::{
    CORS_MAX_AGE_SECS, FEED_LIMIT_DEFAULT, FEED_LIMIT_MAX, MAX_BODY_SIZE_BYTES, SERVER_PORT,
};
use dripfeed_core::{
    BatchOutcome, DropRepository, DropSummary, DropType, EmbedOutcome, EmbeddingBackend,
    EngagementAction, EngagementEvent, EngagementRepository, FeedbackScorer, NewEngagement,
    NewQueueItem, ProfileRepository, QueueCounts, QueueItem, QueueRepository, QueueStatus,
    RankedCandidate, RunKind, RunRecord,
};
use dripfeed_db::{
    Database, PgDropRepository, PgEngagementRepository, PgFeedbackScorer, PgProfileRepository,
    PgQueueRepository,
};
use dripfeed_embed::OllamaBackend;
use dripfeed_fetch::{normalize_url, HttpContentFetcher};
use dripfeed_ingest::{
    sweep_denylisted, EmbedConfig, EmbeddingRunner, IngestWorker, ProcessorConfig, QueueProcessor,
    WorkerConfig,
};
use dripfeed_rank::{ProfileVectorizer, RankConfig, RankingEngine};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so request IDs sort chronologically in
/// log output and line up with the queue item and run record IDs the
/// pipeline mints.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    db: Database,
    /// Queue processor driven by POST /api/queue/process.
    processor: Arc<QueueProcessor>,
    /// Embedding runner driven by POST /api/embeddings/run.
    embedder: Arc<EmbeddingRunner>,
    /// Profile refresher driven by POST /api/profiles/:user_id/refresh.
    vectorizer: Arc<ProfileVectorizer>,
    /// Feed ranking engine behind GET /api/feed/:user_id.
    engine: Arc<RankingEngine>,
}

// =============================================================================
// OPENAPI
// =============================================================================

/// OpenAPI document served at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dripfeed API",
        description = "Content ingestion, embedding, and personalized feed ranking"
    ),
    tags(
        (name = "System", description = "Health checks and system info"),
        (name = "Queue", description = "Ingestion queue operations"),
        (name = "Embeddings", description = "Embedding backlog runs"),
        (name = "Profiles", description = "Taste profile refresh"),
        (name = "Feed", description = "Personalized ranked feeds"),
        (name = "Drops", description = "Content drop updates"),
        (name = "Engagements", description = "Engagement event recording")
    ),
    components(schemas(
        QueueItem,
        NewQueueItem,
        QueueStatus,
        QueueCounts,
        BatchOutcome,
        EmbedOutcome,
        RunRecord,
        RunKind,
        DropSummary,
        DropType,
        RankedCandidate,
        NewEngagement,
        EngagementEvent,
        EngagementAction
    ))
)]
struct ApiDoc;

// =============================================================================
// CORS
// =============================================================================

/// Allowed CORS origins from `ALLOWED_ORIGINS` (comma-separated).
fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());
    parse_origin_list(&origins_str)
}

fn parse_origin_list(origins_str: &str) -> Vec<HeaderValue> {
    if origins_str.trim().is_empty() {
        // Default origins
        return vec![
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT - "json" or "text" (default: "text")
    //   LOG_ANSI   - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG   - standard env filter (default: "dripfeed_server=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dripfeed_server=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        let mut layer = tracing_subscriber::fmt::layer();
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
    }

    info!(log_format = %log_format, "Logging initialized");

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/dripfeed".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| SERVER_PORT.to_string())
        .parse()
        .unwrap_or(SERVER_PORT);

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect(&database_url).await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Repository handles shared by the pipeline components
    let queue: Arc<dyn QueueRepository> = Arc::new(PgQueueRepository::new(db.pool.clone()));
    let drops: Arc<dyn DropRepository> = Arc::new(PgDropRepository::new(db.pool.clone()));
    let engagements: Arc<dyn EngagementRepository> =
        Arc::new(PgEngagementRepository::new(db.pool.clone()));
    let profiles: Arc<dyn ProfileRepository> = Arc::new(PgProfileRepository::new(db.pool.clone()));
    let feedback: Arc<dyn FeedbackScorer> = Arc::new(PgFeedbackScorer::new(db.pool.clone()));

    // Verify the embedding backend is reachable
    let backend = OllamaBackend::from_env();
    if !backend.health_check().await {
        warn!("Embedding backend unreachable, embedding runs will fail until it comes up");
    }
    info!(model = %backend.model_name(), "Embedding backend initialized");

    let fetcher = Arc::new(HttpContentFetcher::from_env());
    let processor = Arc::new(QueueProcessor::new(
        Arc::clone(&queue),
        Arc::clone(&drops),
        fetcher,
        ProcessorConfig::default(),
    ));
    let embedder = Arc::new(EmbeddingRunner::new(
        Arc::clone(&queue),
        Arc::clone(&drops),
        Arc::new(backend),
        EmbedConfig::default(),
    ));
    let vectorizer = Arc::new(ProfileVectorizer::new(
        Arc::clone(&engagements),
        Arc::clone(&profiles),
    ));
    let engine = Arc::new(RankingEngine::new(
        Arc::clone(&drops),
        Arc::clone(&profiles),
        feedback,
        RankConfig::default(),
    ));

    // Create and start the background ingest worker
    let worker_config = WorkerConfig::from_env();
    let worker_handle = if worker_config.enabled {
        info!(
            poll_interval_ms = worker_config.poll_interval_ms,
            "Starting ingest worker..."
        );
        let worker = IngestWorker::new(
            Arc::clone(&processor),
            Arc::clone(&embedder),
            worker_config,
        );
        Some(worker.start())
    } else {
        info!("Ingest worker disabled");
        None
    };

    // Create app state
    let state = AppState {
        db,
        processor,
        embedder,
        vectorizer,
        engine,
    };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // OpenAPI
        .route("/openapi.json", get(openapi_json))
        // Ingestion queue
        .route("/api/queue", post(enqueue_url))
        .route("/api/queue/stats", get(queue_stats))
        .route("/api/queue/process", post(process_queue))
        .route("/api/queue/sweep", post(sweep_queue))
        // Embeddings
        .route("/api/embeddings/run", post(run_embeddings))
        // Profiles and feed
        .route("/api/profiles/:user_id/refresh", post(refresh_profile))
        .route("/api/feed/:user_id", get(get_feed))
        // Drops
        .route("/api/drops/:id/tags", post(update_drop_tags))
        // Engagements
        .route("/api/engagements", post(record_engagement))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer({
            let allowed_origins = parse_allowed_origins();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true)
                .max_age(std::time::Duration::from_secs(CORS_MAX_AGE_SECS))
        })
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE_BYTES))
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker_handle {
        info!("Stopping ingest worker...");
        handle.shutdown().await?;
        info!("Ingest worker stopped");
    }

    Ok(())
}

/// Resolves when the process receives ctrl-c, letting in-flight requests
/// drain before the listener closes.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining in-flight requests"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

// =============================================================================
// SYSTEM HANDLERS
// =============================================================================

/// Liveness plus pipeline freshness: DB ping, queue depth, and the most
/// recent ingest and embed runs.
async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    sqlx::query("SELECT 1")
        .execute(&state.db.pool)
        .await
        .map_err(dripfeed_core::Error::Database)?;

    let counts = state.db.queue.counts().await?;
    let last_ingest = state.db.queue.last_run(RunKind::Ingest).await?;
    let last_embed = state.db.queue.last_run(RunKind::Embed).await?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "queue": counts,
        "last_ingest_run": last_ingest,
        "last_embed_run": last_embed,
    })))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// =============================================================================
// QUEUE HANDLERS
// =============================================================================

async fn enqueue_url(
    State(state): State<AppState>,
    Json(body): Json<NewQueueItem>,
) -> Result<impl IntoResponse, ApiError> {
    // Reject bad URLs at the boundary; the processor normalizes again at
    // fetch time.
    normalize_url(&body.url)?;
    let item = state.db.queue.enqueue(body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn queue_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let counts = state.db.queue.counts().await?;
    Ok(Json(counts))
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    /// Claim at most this many items (processor default when omitted).
    limit: Option<i64>,
}

/// Run one processing batch, for an external scheduler.
async fn process_queue(
    State(state): State<AppState>,
    Json(body): Json<ProcessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = positive_limit(body.limit)?.unwrap_or(state.processor.config().batch_limit);
    let outcome = state.processor.process_batch(limit).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct SweepRequest {
    hosts: Vec<String>,
}

/// Purge pending items whose URL host is on the denylist.
async fn sweep_queue(
    State(state): State<AppState>,
    Json(body): Json<SweepRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let purged = sweep_denylisted(&state.db.queue, &body.hosts).await?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

// =============================================================================
// EMBEDDING HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct EmbedRunRequest {
    /// Scan at most this many drops (runner default when omitted).
    limit: Option<i64>,
}

/// Run one embedding pass over the backlog.
async fn run_embeddings(
    State(state): State<AppState>,
    Json(body): Json<EmbedRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = positive_limit(body.limit)?;
    let outcome = state.embedder.run_backlog(limit).await?;
    Ok(Json(outcome))
}

// =============================================================================
// PROFILE AND FEED HANDLERS
// =============================================================================

/// Rebuild a user's taste profile from their recent engagement.
async fn refresh_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let refreshed = state.vectorizer.refresh_profile(user_id).await?;
    Ok(Json(serde_json::json!({ "updated": refreshed.is_some() })))
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    limit: Option<i64>,
}

/// Serve a personalized ranked feed.
async fn get_feed(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = effective_feed_limit(query.limit);
    let feed = state.engine.rank(user_id, limit).await;
    Ok(Json(feed))
}

// =============================================================================
// DROP HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct TagUpdateRequest {
    tags: Vec<String>,
    tag_done: bool,
}

/// Apply tags produced by the external tagging service.
async fn update_drop_tags(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TagUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .drops
        .set_tags(id, &body.tags, body.tag_done)
        .await?;
    let drop = state
        .db
        .drops
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Drop {} not found", id)))?;
    Ok(Json(DropSummary::from(&drop)))
}

// =============================================================================
// ENGAGEMENT HANDLERS
// =============================================================================

/// Record one engagement event from the client event stream.
async fn record_engagement(
    State(state): State<AppState>,
    Json(body): Json<NewEngagement>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.db.engagement.record(body).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

// =============================================================================
// REQUEST VALIDATION
// =============================================================================

/// Validate an optional positive limit from a request body.
fn positive_limit(limit: Option<i64>) -> Result<Option<i64>, ApiError> {
    match limit {
        Some(l) if l <= 0 => Err(ApiError::BadRequest("limit must be positive".to_string())),
        other => Ok(other),
    }
}

/// Clamp a requested feed size to the service bounds.
fn effective_feed_limit(requested: Option<i64>) -> usize {
    requested
        .unwrap_or(FEED_LIMIT_DEFAULT)
        .clamp(0, FEED_LIMIT_MAX) as usize
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Database(dripfeed_core::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl From<dripfeed_core::Error> for ApiError {
    fn from(err: dripfeed_core::Error) -> Self {
        match &err {
            dripfeed_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            dripfeed_core::Error::DropNotFound(_) | dripfeed_core::Error::QueueItemNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            dripfeed_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            dripfeed_core::Error::Database(sqlx_err) => {
                let msg = sqlx_err.to_string();
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    return ApiError::Conflict(msg);
                }
                if msg.contains("foreign key") {
                    return ApiError::BadRequest(msg);
                }
                ApiError::Database(err)
            }
            _ => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
