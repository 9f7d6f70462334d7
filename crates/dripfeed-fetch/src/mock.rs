//! Mock content fetcher for tests.
//!
//! Serves canned [`FetchedContent`] per URL with configurable failure and
//! latency injection, and records every call. Clones share the call log,
//! so a test can hand the fetcher to a processor and inspect what it did
//! afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dripfeed_core::{ContentFetcher, DropType, Error, FetchedContent, Result};

#[derive(Debug, Clone, Default)]
struct MockConfig {
    responses: HashMap<String, FetchedContent>,
    transient_failures: HashSet<String>,
    permanent_failures: HashSet<String>,
    latency_ms: u64,
}

/// Configurable mock implementing [`ContentFetcher`].
#[derive(Debug, Clone, Default)]
pub struct MockContentFetcher {
    config: Arc<MockConfig>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockContentFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the given content for a URL.
    pub fn with_response(mut self, url: &str, content: FetchedContent) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .insert(url.to_string(), content);
        self
    }

    /// Serve a minimal article (title + summary, nothing else) for a URL.
    pub fn with_article(self, url: &str, title: &str, summary: &str) -> Self {
        self.with_response(
            url,
            FetchedContent {
                canonical_url: None,
                title: title.to_string(),
                summary: summary.to_string(),
                image_url: None,
                content_type: DropType::Article,
                published_at: None,
            },
        )
    }

    /// Fail a URL with a retryable fetch error.
    pub fn with_transient_failure(mut self, url: &str) -> Self {
        Arc::make_mut(&mut self.config)
            .transient_failures
            .insert(url.to_string());
        self
    }

    /// Fail a URL with a permanent `InvalidInput` error.
    pub fn with_permanent_failure(mut self, url: &str) -> Self {
        Arc::make_mut(&mut self.config)
            .permanent_failures
            .insert(url.to_string());
        self
    }

    /// Sleep this long before answering each fetch.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl ContentFetcher for MockContentFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent> {
        self.calls.lock().unwrap().push(url.to_string());

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.config.transient_failures.contains(url) {
            return Err(Error::Fetch(format!("simulated fetch failure: {}", url)));
        }
        if self.config.permanent_failures.contains(url) {
            return Err(Error::InvalidInput(format!(
                "simulated malformed page: {}",
                url
            )));
        }

        self.config
            .responses
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("no canned response for {}", url)))
    }
}
