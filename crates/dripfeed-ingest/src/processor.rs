//! Queue batch processor.
//!
//! Claims pending URLs from the ingest queue, fetches and normalizes them
//! with bounded concurrency, upserts the resulting drops, and settles each
//! queue item according to its error class: malformed input fails
//! permanently, everything else goes back for retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use dripfeed_core::defaults::{
    FETCH_CONCURRENCY, FETCH_CONCURRENCY_MAX, FETCH_CONCURRENCY_MIN, FETCH_TIMEOUT_SECS,
    QUEUE_BATCH_LIMIT,
};
use dripfeed_core::{
    new_v7, BatchOutcome, ContentFetcher, DropRepository, Error, NewDrop, QueueItem,
    QueueRepository, Result, RunKind, RunRecord,
};
use dripfeed_fetch::{normalize_url, url_hash};

/// Configuration for the queue processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum items claimed per batch.
    pub batch_limit: i64,
    /// Concurrent fetches within a batch.
    pub fetch_concurrency: usize,
    /// Wall-clock budget for one item, fetch included.
    pub item_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_limit: QUEUE_BATCH_LIMIT,
            fetch_concurrency: FETCH_CONCURRENCY,
            // Headroom over the fetcher's own timeout so the HTTP error
            // surfaces before the outer deadline fires.
            item_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS + 5),
        }
    }
}

impl ProcessorConfig {
    /// Set the per-batch claim limit.
    pub fn with_batch_limit(mut self, limit: i64) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Set the fetch concurrency, clamped to the supported range.
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.clamp(FETCH_CONCURRENCY_MIN, FETCH_CONCURRENCY_MAX);
        self
    }

    /// Set the per-item timeout.
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }
}

/// Processes claimed queue items into content drops.
pub struct QueueProcessor {
    queue: Arc<dyn QueueRepository>,
    drops: Arc<dyn DropRepository>,
    fetcher: Arc<dyn ContentFetcher>,
    config: ProcessorConfig,
}

/// Shared handles cloned into each spawned item task.
struct ItemRefs {
    queue: Arc<dyn QueueRepository>,
    drops: Arc<dyn DropRepository>,
    fetcher: Arc<dyn ContentFetcher>,
    item_timeout: Duration,
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        drops: Arc<dyn DropRepository>,
        fetcher: Arc<dyn ContentFetcher>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue,
            drops,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Claim and process up to `limit` pending queue items.
    ///
    /// Items fan out across a [`JoinSet`] gated by a semaphore of
    /// `fetch_concurrency` permits; one item's failure never affects its
    /// batchmates. Every claimed item is counted in the outcome, and a
    /// run record is written after every non-empty batch.
    #[instrument(skip(self), fields(subsystem = "ingest", component = "processor", op = "process_batch"))]
    pub async fn process_batch(&self, limit: i64) -> Result<BatchOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();

        let claimed = self.queue.claim_batch(limit).await?;
        if claimed.is_empty() {
            debug!("No pending queue items");
            return Ok(BatchOutcome::default());
        }

        let processed = claimed.len();
        let permits = Arc::new(Semaphore::new(self.config.fetch_concurrency));
        let mut tasks: JoinSet<bool> = JoinSet::new();

        for item in claimed {
            let refs = ItemRefs {
                queue: Arc::clone(&self.queue),
                drops: Arc::clone(&self.drops),
                fetcher: Arc::clone(&self.fetcher),
                item_timeout: self.config.item_timeout,
            };
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    // Semaphore only closes on teardown; the stuck-item
                    // sweep recovers the claim.
                    return false;
                };
                refs.process_item(item).await
            });
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => succeeded += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!(error = ?e, "Queue item task panicked");
                    failed += 1;
                }
            }
        }

        let outcome = BatchOutcome {
            processed,
            succeeded,
            failed,
        };

        let run = RunRecord {
            id: new_v7(),
            kind: RunKind::Ingest,
            started_at,
            finished_at: Utc::now(),
            processed: outcome.processed as i32,
            succeeded: outcome.succeeded as i32,
            failed: outcome.failed as i32,
            error: None,
        };
        if let Err(e) = self.queue.record_run(&run).await {
            warn!(error = %e, "Failed to record ingest run");
        }

        info!(
            processed = outcome.processed,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Queue batch complete"
        );
        Ok(outcome)
    }
}

impl ItemRefs {
    /// Process one claimed item end to end. Returns `true` on success.
    async fn process_item(&self, item: QueueItem) -> bool {
        let start = Instant::now();
        match self.ingest(&item).await {
            Ok(drop_id) => {
                if let Err(e) = self.queue.complete(item.id).await {
                    error!(item_id = %item.id, error = %e, "Failed to mark queue item done");
                    return false;
                }
                debug!(
                    item_id = %item.id,
                    drop_id = %drop_id,
                    tries = item.tries,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Queue item ingested"
                );
                true
            }
            Err(e) => {
                let permanent = !e.is_retryable();
                let message = e.to_string();
                warn!(
                    item_id = %item.id,
                    url = %item.url,
                    tries = item.tries,
                    permanent,
                    error = %message,
                    "Queue item failed"
                );
                let settled = if permanent {
                    self.queue.fail_permanent(item.id, &message).await
                } else {
                    self.queue.fail(item.id, &message).await
                };
                if let Err(e) = settled {
                    error!(item_id = %item.id, error = %e, "Failed to settle queue item");
                }
                false
            }
        }
    }

    /// Fetch, normalize, dedup, and store one URL. Returns the drop ID.
    async fn ingest(&self, item: &QueueItem) -> Result<Uuid> {
        // Normalize before any network traffic so unparseable URLs fail
        // permanently without burning a fetch.
        let normalized = normalize_url(&item.url)?;

        let fetched = tokio::time::timeout(self.item_timeout, self.fetcher.fetch(&normalized))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Fetch of {} exceeded {:?}",
                    normalized, self.item_timeout
                ))
            })??;

        // The page's canonical URL is the identity of record when it
        // normalizes cleanly; otherwise the queued URL's normal form is.
        let url = fetched
            .canonical_url
            .as_deref()
            .and_then(|c| normalize_url(c).ok())
            .unwrap_or(normalized);
        let hash = url_hash(&url);

        let drop = self
            .drops
            .upsert(NewDrop {
                url,
                url_hash: hash,
                title: fetched.title,
                summary: fetched.summary,
                image_url: fetched.image_url,
                content_type: fetched.content_type,
                source_id: item.source_id,
                published_at: fetched.published_at,
            })
            .await?;

        Ok(drop.id)
    }
}
