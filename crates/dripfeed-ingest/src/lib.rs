//! # dripfeed-ingest
//!
//! The pipeline half of dripfeed: [`QueueProcessor`] turns claimed queue
//! items into content drops, [`EmbeddingRunner`] embeds the drop backlog,
//! and [`IngestWorker`] drives both from a poll loop. [`sweep_denylisted`]
//! is the queue maintenance entry point.

pub mod embedder;
pub mod processor;
pub mod sweep;
pub mod worker;

pub use embedder::{EmbedConfig, EmbeddingRunner};
pub use processor::{ProcessorConfig, QueueProcessor};
pub use sweep::{normalize_hosts, sweep_denylisted};
pub use worker::{IngestWorker, WorkerConfig, WorkerHandle};
