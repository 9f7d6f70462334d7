//! Mock embedding backend for deterministic testing.
//!
//! Implements [`EmbeddingBackend`] with vectors derived from the input
//! text, so the same text always embeds to the same vector and tests can
//! assert on similarity without a model server. Failure injection is
//! counter-based rather than random: a test that says "fail after two
//! batches" gets exactly that, every run.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use dripfeed_core::{EmbeddingBackend, Error, Result, Vector};

/// Mock embedding backend for testing.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    /// Batches beyond this count fail with a simulated error.
    fail_after: Option<usize>,
    /// Specific 1-based batch numbers that fail.
    fail_on_calls: Vec<usize>,
    latency_ms: u64,
}

/// One recorded `embed_texts` call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub texts: Vec<String>,
    pub timestamp: Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: dripfeed_core::defaults::EMBED_DIMENSION,
            fail_after: None,
            fail_on_calls: Vec::new(),
            latency_ms: 0,
        }
    }
}

impl MockEmbeddingBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Fail every batch after the first `batches` successful ones.
    pub fn with_failure_after(mut self, batches: usize) -> Self {
        Arc::make_mut(&mut self.config).fail_after = Some(batches);
        self
    }

    /// Fail every batch.
    pub fn with_failure(self) -> Self {
        self.with_failure_after(0)
    }

    /// Fail a specific 1-based batch number.
    pub fn with_failure_on_call(mut self, call: usize) -> Self {
        Arc::make_mut(&mut self.config).fail_on_calls.push(call);
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    /// Get number of `embed_texts` calls made so far.
    pub fn embed_call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Total number of texts embedded across all calls.
    pub fn embedded_text_count(&self) -> usize {
        self.call_log.lock().unwrap().iter().map(|c| c.texts.len()).sum()
    }

    fn log_call(&self, texts: &[String]) -> usize {
        let mut log = self.call_log.lock().unwrap();
        log.push(MockCall {
            texts: texts.to_vec(),
            timestamp: Instant::now(),
        });
        log.len()
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let call_number = self.log_call(texts);
        self.simulate_latency().await;

        let past_threshold = self
            .config
            .fail_after
            .is_some_and(|after| call_number > after);
        if past_threshold || self.config.fail_on_calls.contains(&call_number) {
            return Err(Error::Embedding(format!(
                "Simulated failure on batch {}",
                call_number
            )));
        }

        Ok(texts
            .iter()
            .map(|text| Vector::from(MockEmbeddingGenerator::generate(text, self.config.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// will always produce the same embedding.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate embedding from seed (for random-like but deterministic vectors).
    pub fn generate_with_seed(seed: u64, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        let mut state = seed;

        // Simple LCG for deterministic pseudo-random values
        for item in vec.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *item = ((state % 1000) as f32) / 1000.0 - 0.5;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate a pair of embeddings with high (but not perfect) cosine
    /// similarity, for tests that need "close" vectors.
    pub fn generate_similar_pair(
        base_text: &str,
        dimension: usize,
        similarity: f64,
    ) -> (Vec<f32>, Vec<f32>) {
        let base = Self::generate(base_text, dimension);
        let mut similar = Self::generate_with_seed(12345, dimension);

        let alpha = similarity as f32;
        for i in 0..dimension {
            similar[i] = alpha * base[i] + (1.0 - alpha) * similar[i];
        }

        Self::normalize(&mut similar);
        (base, similar)
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}
