//! # dripfeed-embed
//!
//! Embedding backends for the dripfeed pipeline.
//!
//! [`OllamaBackend`] talks to a local Ollama server's `/api/embed`
//! endpoint; [`MockEmbeddingBackend`] generates deterministic vectors for
//! tests. Both implement [`EmbeddingBackend`] from dripfeed-core.

pub mod mock;
pub mod ollama;

pub use mock::{MockEmbeddingBackend, MockEmbeddingGenerator};
pub use ollama::OllamaBackend;

// Re-export the trait and vector type so embed callers need only this crate.
pub use dripfeed_core::{EmbeddingBackend, Vector};
