//! Background worker driving the ingest pipeline.
//!
//! A single poll loop alternates queue batches with periodic embedding
//! runs. Batch runs are single-flight per process; item-level concurrency
//! lives inside [`QueueProcessor`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, instrument};

use dripfeed_core::defaults::{WORKER_EMBED_EVERY, WORKER_POLL_INTERVAL_MS};
use dripfeed_core::{Error, Result};

use crate::embedder::EmbeddingRunner;
use crate::processor::QueueProcessor;

/// Configuration for the ingest worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Run the embedding backlog every Nth poll.
    pub embed_every_n_polls: u32,
    /// Whether to run the loop at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            embed_every_n_polls: WORKER_EMBED_EVERY,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PIPELINE_WORKER_ENABLED` | `true` | Enable/disable the poll loop |
    /// | `PIPELINE_POLL_INTERVAL_MS` | `5000` | Sleep between polls when the queue is empty |
    /// | `PIPELINE_EMBED_EVERY` | `6` | Run the embedder every Nth poll |
    pub fn from_env() -> Self {
        let enabled = std::env::var("PIPELINE_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("PIPELINE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(WORKER_POLL_INTERVAL_MS);

        let embed_every_n_polls = std::env::var("PIPELINE_EMBED_EVERY")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(WORKER_EMBED_EVERY)
            .max(1);

        Self {
            poll_interval_ms,
            embed_every_n_polls,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set how often the embedder runs, in polls.
    pub fn with_embed_every(mut self, polls: u32) -> Self {
        self.embed_every_n_polls = polls.max(1);
        self
    }

    /// Enable or disable the worker loop.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Handle for stopping a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the loop already exited on its own.
        let _ = self.shutdown_tx.send(()).await;
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("Worker task panicked: {}", e)))
    }
}

/// Poll-driven worker that feeds the queue processor and embedder.
pub struct IngestWorker {
    processor: Arc<QueueProcessor>,
    embedder: Arc<EmbeddingRunner>,
    config: WorkerConfig,
}

impl IngestWorker {
    pub fn new(
        processor: Arc<QueueProcessor>,
        embedder: Arc<EmbeddingRunner>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            processor,
            embedder,
            config,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            handle,
        }
    }

    /// Run the poll loop until shutdown.
    ///
    /// Only sleeps when the queue is empty; a non-empty batch claims again
    /// immediately. Every Nth poll also drains the embedding backlog.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Ingest worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            embed_every_n_polls = self.config.embed_every_n_polls,
            "Ingest worker started"
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let embed_every = u64::from(self.config.embed_every_n_polls.max(1));
        let mut polls: u64 = 0;

        loop {
            // Check for shutdown before claiming work
            if shutdown_rx.try_recv().is_ok() {
                info!("Ingest worker received shutdown signal");
                break;
            }

            polls += 1;

            let batch_limit = self.processor.config().batch_limit;
            let processed = match self.processor.process_batch(batch_limit).await {
                Ok(outcome) => outcome.processed,
                Err(e) => {
                    error!(error = %e, "Queue batch failed");
                    0
                }
            };

            if polls % embed_every == 0 {
                if let Err(e) = self.embedder.run_backlog(None).await {
                    error!(error = %e, "Embedding run failed");
                }
            }

            if processed == 0 {
                // Queue empty, sleep before polling again
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Ingest worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
            // Otherwise claim again immediately
        }

        info!("Ingest worker stopped");
    }
}
