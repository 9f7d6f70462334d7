//! # dripfeed-db
//!
//! PostgreSQL database layer for dripfeed.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for the ingest queue, content drops,
//!   engagement events, and profile vectors
//! - Vector storage with pgvector
//! - The SQL-backed feedback scorer used by the ranking engine
//!
//! ## Example
//!
//! ```rust,ignore
//! use dripfeed_db::{Database, NewQueueItem, QueueRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/dripfeed").await?;
//!
//!     let item = db.queue.enqueue(NewQueueItem {
//!         url: "https://example.com/article".to_string(),
//!         source_id: None,
//!     }).await?;
//!
//!     println!("Queued: {}", item.id);
//!     Ok(())
//! }
//! ```
pub mod drops;
pub mod engagement;
pub mod feedback;
pub mod pool;
pub mod profiles;
pub mod queue;

// Re-export core types
pub use dripfeed_core::*;

// Re-export repository implementations
pub use drops::PgDropRepository;
pub use engagement::PgEngagementRepository;
pub use feedback::PgFeedbackScorer;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use profiles::PgProfileRepository;
pub use queue::PgQueueRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Ingest queue repository.
    pub queue: PgQueueRepository,
    /// Content drop repository.
    pub drops: PgDropRepository,
    /// Engagement event repository.
    pub engagement: PgEngagementRepository,
    /// Profile vector repository.
    pub profiles: PgProfileRepository,
    /// SQL-backed feedback scorer for the ranking engine.
    pub feedback: PgFeedbackScorer,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            queue: PgQueueRepository::new(pool.clone()),
            drops: PgDropRepository::new(pool.clone()),
            engagement: PgEngagementRepository::new(pool.clone()),
            profiles: PgProfileRepository::new(pool.clone()),
            feedback: PgFeedbackScorer::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
