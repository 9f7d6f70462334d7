//! Embedding backlog runner.
//!
//! Selects drops that need (re-)embedding, assembles their text, and
//! pushes them through the embedding backend in bounded batches. Batches
//! are isolated: a failed batch is logged and skipped while later batches
//! still run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info, instrument, warn};

use dripfeed_core::defaults::{
    EMBED_BACKLOG_LIMIT, EMBED_BATCH_MAX, EMBED_BATCH_PAUSE_MS, EMBED_RECENT_WINDOW_DAYS,
};
use dripfeed_core::{
    new_v7, ContentRecord, DropRepository, EmbedOutcome, EmbeddingBackend, QueueRepository, Result,
    RunKind, RunRecord,
};

/// Configuration for embedding backlog runs.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Maximum drops selected per run.
    pub backlog_limit: i64,
    /// Maximum texts per backend call.
    pub batch_max: usize,
    /// Pause between consecutive backend calls.
    pub batch_pause: Duration,
    /// Re-embed drops updated within this trailing window.
    pub recent_window_days: i64,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            backlog_limit: EMBED_BACKLOG_LIMIT,
            batch_max: EMBED_BATCH_MAX,
            batch_pause: Duration::from_millis(EMBED_BATCH_PAUSE_MS),
            recent_window_days: EMBED_RECENT_WINDOW_DAYS,
        }
    }
}

impl EmbedConfig {
    /// Set the per-run selection cap.
    pub fn with_backlog_limit(mut self, limit: i64) -> Self {
        self.backlog_limit = limit;
        self
    }

    /// Set the batch size, clamped to what the backend accepts.
    pub fn with_batch_max(mut self, batch_max: usize) -> Self {
        self.batch_max = batch_max.clamp(1, EMBED_BATCH_MAX);
        self
    }

    /// Set the pause between backend calls.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Set the trailing re-embed window.
    pub fn with_recent_window_days(mut self, days: i64) -> Self {
        self.recent_window_days = days;
        self
    }
}

/// Embeds the backlog of drops without a current embedding.
pub struct EmbeddingRunner {
    queue: Arc<dyn QueueRepository>,
    drops: Arc<dyn DropRepository>,
    backend: Arc<dyn EmbeddingBackend>,
    config: EmbedConfig,
}

impl EmbeddingRunner {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        drops: Arc<dyn DropRepository>,
        backend: Arc<dyn EmbeddingBackend>,
        config: EmbedConfig,
    ) -> Self {
        Self {
            queue,
            drops,
            backend,
            config,
        }
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Embed up to `limit` drops from the backlog (config default if
    /// `None`).
    ///
    /// Selection covers drops without an embedding plus drops updated
    /// within the trailing window, oldest first. Re-running with no new
    /// or changed content embeds nothing.
    #[instrument(skip(self), fields(subsystem = "ingest", component = "embedder", op = "run_backlog"))]
    pub async fn run_backlog(&self, limit: Option<i64>) -> Result<EmbedOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();
        let limit = limit.unwrap_or(self.config.backlog_limit);
        let cutoff = started_at - ChronoDuration::days(self.config.recent_window_days);

        let pending = self.drops.needing_embedding(cutoff, limit).await?;
        if pending.is_empty() {
            debug!("Embedding backlog is empty");
            return Ok(EmbedOutcome::default());
        }

        let total_batches = pending.len().div_ceil(self.config.batch_max);
        let mut outcome = EmbedOutcome {
            scanned: pending.len(),
            ..Default::default()
        };

        for (batch_index, batch) in pending.chunks(self.config.batch_max).enumerate() {
            if batch_index > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            let texts: Vec<String> = batch.iter().map(ContentRecord::embedding_text).collect();
            let vectors = match self.backend.embed_texts(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    warn!(
                        batch = batch_index + 1,
                        expected = batch.len(),
                        got = vectors.len(),
                        "Embedding batch returned wrong count, skipping"
                    );
                    outcome.failed_batches += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        batch = batch_index + 1,
                        size = batch.len(),
                        error = %e,
                        "Embedding batch failed, skipping"
                    );
                    outcome.failed_batches += 1;
                    continue;
                }
            };

            for (record, vector) in batch.iter().zip(vectors) {
                match self.drops.set_embedding(record.id, &vector).await {
                    Ok(()) => outcome.embedded += 1,
                    Err(e) => {
                        warn!(drop_id = %record.id, error = %e, "Failed to store embedding");
                    }
                }
            }
        }

        let run = RunRecord {
            id: new_v7(),
            kind: RunKind::Embed,
            started_at,
            finished_at: Utc::now(),
            processed: outcome.scanned as i32,
            succeeded: outcome.embedded as i32,
            failed: (outcome.scanned - outcome.embedded) as i32,
            error: (outcome.failed_batches > 0)
                .then(|| format!("{} of {} batches failed", outcome.failed_batches, total_batches)),
        };
        if let Err(e) = self.queue.record_run(&run).await {
            warn!(error = %e, "Failed to record embed run");
        }

        info!(
            scanned = outcome.scanned,
            embedded = outcome.embedded,
            failed_batches = outcome.failed_batches,
            model = self.backend.model_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding run complete"
        );
        Ok(outcome)
    }
}
