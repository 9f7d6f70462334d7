//! End-to-end pipeline tests against in-memory repositories.
//!
//! The fakes mirror the repository contracts (claim increments `tries`,
//! settlement goes through `QueueStatus::after_failure`, upsert dedups on
//! `url_hash`) so the processor, embedder, and worker are exercised with
//! real control flow and no database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use dripfeed_core::defaults::QUEUE_MAX_TRIES;
use dripfeed_core::{
    new_v7, BatchOutcome, ContentRecord, DropRepository, DropType, EmbedOutcome, Error,
    FetchedContent, NewDrop, NewQueueItem, QueueCounts, QueueItem, QueueRepository, QueueStatus,
    Result, RunKind, RunRecord, Vector,
};
use dripfeed_embed::MockEmbeddingBackend;
use dripfeed_fetch::{normalize_and_hash, MockContentFetcher};
use dripfeed_ingest::{
    sweep_denylisted, EmbedConfig, EmbeddingRunner, IngestWorker, ProcessorConfig, QueueProcessor,
    WorkerConfig,
};

// =============================================================================
// IN-MEMORY FAKES
// =============================================================================

#[derive(Clone, Default)]
struct InMemoryQueue {
    items: Arc<Mutex<HashMap<Uuid, QueueItem>>>,
    runs: Arc<Mutex<Vec<RunRecord>>>,
}

impl InMemoryQueue {
    fn settle_failure(&self, id: Uuid, error: &str, permanent: bool) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(&id).ok_or(Error::QueueItemNotFound(id))?;
        item.status = QueueStatus::after_failure(item.tries, permanent);
        item.error = Some(error.to_string());
        item.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueue {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem> {
        let now = Utc::now();
        let queued = QueueItem {
            id: new_v7(),
            url: item.url,
            status: QueueStatus::Pending,
            tries: 0,
            error: None,
            source_id: item.source_id,
            created_at: now,
            updated_at: now,
        };
        self.items.lock().unwrap().insert(queued.id, queued.clone());
        Ok(queued)
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<QueueItem>> {
        let mut items = self.items.lock().unwrap();
        // UUIDv7 ids sort by insertion time, giving oldest-first claims.
        let mut pending: Vec<Uuid> = items
            .values()
            .filter(|i| i.status == QueueStatus::Pending)
            .map(|i| i.id)
            .collect();
        pending.sort();
        pending.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(pending.len());
        for id in pending {
            if let Some(item) = items.get_mut(&id) {
                item.status = QueueStatus::Processing;
                item.tries += 1;
                item.updated_at = Utc::now();
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(&id).ok_or(Error::QueueItemNotFound(id))?;
        item.status = QueueStatus::Done;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        self.settle_failure(id, error, false)
    }

    async fn fail_permanent(&self, id: Uuid, error: &str) -> Result<()> {
        self.settle_failure(id, error, true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>> {
        Ok(self.items.lock().unwrap().get(&id).cloned())
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let items = self.items.lock().unwrap();
        let mut counts = QueueCounts::default();
        for item in items.values() {
            match item.status {
                QueueStatus::Pending => counts.pending += 1,
                QueueStatus::Processing => counts.processing += 1,
                QueueStatus::Done => counts.done += 1,
                QueueStatus::Error => counts.error += 1,
            }
        }
        Ok(counts)
    }

    async fn requeue_stuck(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut items = self.items.lock().unwrap();
        let mut requeued = 0;
        for item in items.values_mut() {
            if item.status == QueueStatus::Processing && item.updated_at < older_than {
                item.status = QueueStatus::Pending;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn purge_denylisted(&self, hosts: &[String]) -> Result<u64> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|_, item| {
            !(item.status == QueueStatus::Error
                && hosts.iter().any(|h| item.url.contains(h.as_str())))
        });
        Ok((before - items.len()) as u64)
    }

    async fn record_run(&self, run: &RunRecord) -> Result<()> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn last_run(&self, kind: RunKind) -> Result<Option<RunRecord>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.kind == kind)
            .cloned())
    }
}

#[derive(Clone, Default)]
struct InMemoryDrops {
    by_hash: Arc<Mutex<HashMap<String, ContentRecord>>>,
}

impl InMemoryDrops {
    fn seed(&self, record: ContentRecord) {
        self.by_hash
            .lock()
            .unwrap()
            .insert(record.url_hash.clone(), record);
    }

    fn len(&self) -> usize {
        self.by_hash.lock().unwrap().len()
    }

    fn get_by_hash(&self, hash: &str) -> Option<ContentRecord> {
        self.by_hash.lock().unwrap().get(hash).cloned()
    }

    fn embedded_count(&self) -> usize {
        self.by_hash
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.embedding.is_some())
            .count()
    }
}

#[async_trait]
impl DropRepository for InMemoryDrops {
    async fn upsert(&self, drop: NewDrop) -> Result<ContentRecord> {
        let mut map = self.by_hash.lock().unwrap();
        let now = Utc::now();
        let record = match map.get_mut(&drop.url_hash) {
            Some(existing) => {
                existing.url = drop.url;
                existing.title = drop.title;
                existing.summary = drop.summary;
                existing.image_url = drop.image_url;
                existing.content_type = drop.content_type;
                existing.source_id = drop.source_id;
                existing.published_at = drop.published_at;
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let record = ContentRecord {
                    id: new_v7(),
                    url: drop.url,
                    url_hash: drop.url_hash.clone(),
                    title: drop.title,
                    summary: drop.summary,
                    image_url: drop.image_url,
                    content_type: drop.content_type,
                    tags: Vec::new(),
                    tag_done: false,
                    source_id: drop.source_id,
                    sponsored: false,
                    published_at: drop.published_at,
                    authority_score: None,
                    quality_score: None,
                    popularity_score: None,
                    embedding: None,
                    created_at: now,
                    updated_at: now,
                };
                map.insert(drop.url_hash, record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>> {
        Ok(self
            .by_hash
            .lock()
            .unwrap()
            .values()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn set_tags(&self, id: Uuid, tags: &[String], tag_done: bool) -> Result<()> {
        let mut map = self.by_hash.lock().unwrap();
        let record = map
            .values_mut()
            .find(|r| r.id == id)
            .ok_or(Error::DropNotFound(id))?;
        record.tags = tags.to_vec();
        record.tag_done = tag_done;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn set_embedding(&self, id: Uuid, embedding: &Vector) -> Result<()> {
        let mut map = self.by_hash.lock().unwrap();
        let record = map
            .values_mut()
            .find(|r| r.id == id)
            .ok_or(Error::DropNotFound(id))?;
        record.embedding = Some(embedding.clone());
        Ok(())
    }

    async fn needing_embedding(
        &self,
        updated_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentRecord>> {
        let map = self.by_hash.lock().unwrap();
        let mut selected: Vec<ContentRecord> = map
            .values()
            .filter(|r| r.embedding.is_none() || r.updated_at > updated_since)
            .cloned()
            .collect();
        selected.sort_by_key(|r| (r.created_at, r.id));
        selected.truncate(limit.max(0) as usize);
        Ok(selected)
    }

    async fn rankable(
        &self,
        published_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentRecord>> {
        let map = self.by_hash.lock().unwrap();
        let mut selected: Vec<ContentRecord> = map
            .values()
            .filter(|r| r.tag_done && r.published_at.is_some_and(|p| p >= published_since))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        selected.truncate(limit.max(0) as usize);
        Ok(selected)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn processor(
    queue: &InMemoryQueue,
    drops: &InMemoryDrops,
    fetcher: &MockContentFetcher,
) -> QueueProcessor {
    QueueProcessor::new(
        Arc::new(queue.clone()),
        Arc::new(drops.clone()),
        Arc::new(fetcher.clone()),
        ProcessorConfig::default(),
    )
}

fn embed_runner(
    queue: &InMemoryQueue,
    drops: &InMemoryDrops,
    backend: &MockEmbeddingBackend,
) -> EmbeddingRunner {
    EmbeddingRunner::new(
        Arc::new(queue.clone()),
        Arc::new(drops.clone()),
        Arc::new(backend.clone()),
        EmbedConfig::default().with_batch_pause(Duration::ZERO),
    )
}

async fn enqueue(queue: &InMemoryQueue, url: &str) -> QueueItem {
    queue
        .enqueue(NewQueueItem {
            url: url.to_string(),
            source_id: None,
        })
        .await
        .unwrap()
}

/// A drop old enough to fall outside the re-embed window once embedded.
fn stale_drop(n: usize) -> ContentRecord {
    let past = Utc::now() - ChronoDuration::days(30);
    ContentRecord {
        id: new_v7(),
        url: format!("https://drops.test/{n}"),
        url_hash: format!("hash-{n:04}"),
        title: format!("Drop {n}"),
        summary: "A summary".to_string(),
        image_url: None,
        content_type: DropType::Article,
        tags: vec!["tech".to_string()],
        tag_done: true,
        source_id: None,
        sponsored: false,
        published_at: Some(past),
        authority_score: None,
        quality_score: None,
        popularity_score: None,
        embedding: None,
        created_at: past,
        updated_at: past,
    }
}

// =============================================================================
// QUEUE PROCESSOR
// =============================================================================

#[tokio::test]
async fn batch_ingests_claimed_urls_end_to_end() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new()
        .with_article("https://news.test/rust-1.80", "Rust 1.80", "Release notes")
        .with_article("https://news.test/tokio", "Tokio tips", "Async patterns")
        .with_article("https://news.test/pgvector", "pgvector", "Vector search");

    for url in [
        "https://news.test/rust-1.80",
        "https://news.test/tokio",
        "https://news.test/pgvector",
    ] {
        enqueue(&queue, url).await;
    }

    let outcome = processor(&queue, &drops, &fetcher)
        .process_batch(25)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        BatchOutcome {
            processed: 3,
            succeeded: 3,
            failed: 0
        }
    );

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.done, 3);
    assert_eq!(counts.total(), 3);
    assert_eq!(drops.len(), 3);

    let run = queue.last_run(RunKind::Ingest).await.unwrap().unwrap();
    assert_eq!(run.processed, 3);
    assert_eq!(run.succeeded, 3);
    assert_eq!(run.failed, 0);
    assert!(run.error.is_none());
}

#[tokio::test]
async fn transient_failures_retry_until_the_budget_runs_out() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new().with_transient_failure("https://flaky.test/a");

    let item = enqueue(&queue, "https://flaky.test/a").await;
    let proc = processor(&queue, &drops, &fetcher);

    for attempt in 1..=QUEUE_MAX_TRIES {
        let outcome = proc.process_batch(25).await.unwrap();
        assert_eq!(outcome.processed, 1, "attempt {attempt} should claim");
        assert_eq!(outcome.failed, 1);
    }

    // Budget exhausted: nothing left to claim.
    let outcome = proc.process_batch(25).await.unwrap();
    assert_eq!(outcome.processed, 0);

    let settled = queue.get(item.id).await.unwrap().unwrap();
    assert_eq!(settled.status, QueueStatus::Error);
    assert_eq!(settled.tries, QUEUE_MAX_TRIES);
    assert!(settled
        .error
        .unwrap()
        .contains("simulated fetch failure"));
    assert_eq!(drops.len(), 0);
}

#[tokio::test]
async fn unparseable_url_fails_permanently_without_fetching() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new();

    let item = enqueue(&queue, "not a url").await;

    let outcome = processor(&queue, &drops, &fetcher)
        .process_batch(25)
        .await
        .unwrap();
    assert_eq!(outcome.failed, 1);

    let settled = queue.get(item.id).await.unwrap().unwrap();
    assert_eq!(settled.status, QueueStatus::Error);
    assert_eq!(settled.tries, 1, "no retries for malformed input");
    assert!(settled.error.unwrap().contains("Invalid URL"));
    assert_eq!(fetcher.fetch_call_count(), 0, "no fetch for a bad URL");
}

#[tokio::test]
async fn malformed_page_is_not_retried() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new().with_permanent_failure("https://broken.test/page");

    let item = enqueue(&queue, "https://broken.test/page").await;
    let proc = processor(&queue, &drops, &fetcher);

    proc.process_batch(25).await.unwrap();

    let settled = queue.get(item.id).await.unwrap().unwrap();
    assert_eq!(settled.status, QueueStatus::Error);
    assert_eq!(settled.tries, 1);

    let outcome = proc.process_batch(25).await.unwrap();
    assert_eq!(outcome.processed, 0, "terminal items are never reclaimed");
}

#[tokio::test]
async fn equivalent_urls_dedup_to_one_drop() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    // Both spellings normalize to the only URL the mock serves.
    let fetcher =
        MockContentFetcher::new().with_article("https://news.test/article", "One", "Same content");

    enqueue(&queue, "https://news.test/article?utm_source=rss&fbclid=x").await;
    enqueue(&queue, "https://NEWS.test/article#section").await;

    let outcome = processor(&queue, &drops, &fetcher)
        .process_batch(25)
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(drops.len(), 1, "same normalized URL collapses to one drop");

    let (_, hash) = normalize_and_hash("https://news.test/article").unwrap();
    assert!(drops.get_by_hash(&hash).is_some());
}

#[tokio::test]
async fn canonical_url_becomes_the_identity_of_record() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new().with_response(
        "https://news.test/share/abc123",
        FetchedContent {
            canonical_url: Some("https://news.test/article-7?utm_campaign=share".to_string()),
            title: "Article Seven".to_string(),
            summary: "Body".to_string(),
            image_url: None,
            content_type: DropType::Article,
            published_at: None,
        },
    );

    enqueue(&queue, "https://news.test/share/abc123").await;

    let outcome = processor(&queue, &drops, &fetcher)
        .process_batch(25)
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);

    let (canonical, hash) = normalize_and_hash("https://news.test/article-7").unwrap();
    let drop = drops.get_by_hash(&hash).expect("stored under canonical hash");
    assert_eq!(drop.url, canonical);
    assert_eq!(drop.title, "Article Seven");
}

#[tokio::test]
async fn one_bad_item_never_sinks_its_batchmates() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new()
        .with_article("https://mixed.test/good-1", "Good One", "")
        .with_article("https://mixed.test/good-2", "Good Two", "")
        .with_transient_failure("https://mixed.test/flaky")
        .with_permanent_failure("https://mixed.test/broken");

    for url in [
        "https://mixed.test/good-1",
        "https://mixed.test/flaky",
        "https://mixed.test/good-2",
        "https://mixed.test/broken",
    ] {
        enqueue(&queue, url).await;
    }

    let outcome = processor(&queue, &drops, &fetcher)
        .process_batch(25)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        BatchOutcome {
            processed: 4,
            succeeded: 2,
            failed: 2
        }
    );
    assert_eq!(drops.len(), 2);

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.done, 2);
    assert_eq!(counts.pending, 1, "transient failure goes back for retry");
    assert_eq!(counts.error, 1, "permanent failure is terminal");
}

#[tokio::test]
async fn claim_respects_limit_and_leaves_the_rest_pending() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let mut fetcher = MockContentFetcher::new();
    for n in 0..5 {
        fetcher = fetcher.with_article(&format!("https://many.test/{n}"), &format!("T{n}"), "");
    }
    for n in 0..5 {
        enqueue(&queue, &format!("https://many.test/{n}")).await;
    }

    let outcome = processor(&queue, &drops, &fetcher)
        .process_batch(2)
        .await
        .unwrap();

    assert_eq!(outcome.processed, 2);
    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.done, 2);
    assert_eq!(counts.pending, 3);
}

#[tokio::test]
async fn empty_claim_writes_no_run_record() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new();

    let outcome = processor(&queue, &drops, &fetcher)
        .process_batch(25)
        .await
        .unwrap();

    assert_eq!(outcome, BatchOutcome::default());
    assert!(queue.last_run(RunKind::Ingest).await.unwrap().is_none());
}

#[tokio::test]
async fn stuck_processing_items_requeue_without_extra_tries() {
    let queue = InMemoryQueue::default();
    let item = enqueue(&queue, "https://stuck.test/a").await;

    let claimed = queue.claim_batch(1).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].tries, 1);

    let requeued = queue
        .requeue_stuck(Utc::now() + ChronoDuration::seconds(1))
        .await
        .unwrap();
    assert_eq!(requeued, 1);

    let recovered = queue.get(item.id).await.unwrap().unwrap();
    assert_eq!(recovered.status, QueueStatus::Pending);
    assert_eq!(recovered.tries, 1, "requeue does not charge the budget");
}

// =============================================================================
// EMBEDDING RUNNER
// =============================================================================

#[tokio::test]
async fn backlog_embeds_in_bounded_batches() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    for n in 0..250 {
        drops.seed(stale_drop(n));
    }
    let backend = MockEmbeddingBackend::new().with_dimension(16);

    let outcome = embed_runner(&queue, &drops, &backend)
        .run_backlog(None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        EmbedOutcome {
            scanned: 250,
            embedded: 250,
            failed_batches: 0
        }
    );
    assert_eq!(backend.embed_call_count(), 3);
    let sizes: Vec<usize> = backend.get_calls().iter().map(|c| c.texts.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(drops.embedded_count(), 250);

    let run = queue.last_run(RunKind::Embed).await.unwrap().unwrap();
    assert_eq!(run.processed, 250);
    assert_eq!(run.succeeded, 250);
    assert!(run.error.is_none());
}

#[tokio::test]
async fn failed_batch_is_skipped_and_the_rest_still_embed() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    for n in 0..250 {
        drops.seed(stale_drop(n));
    }
    let backend = MockEmbeddingBackend::new()
        .with_dimension(16)
        .with_failure_on_call(2);

    let outcome = embed_runner(&queue, &drops, &backend)
        .run_backlog(None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        EmbedOutcome {
            scanned: 250,
            embedded: 150,
            failed_batches: 1
        }
    );
    assert_eq!(backend.embed_call_count(), 3, "later batches still ran");
    assert_eq!(drops.embedded_count(), 150);

    let run = queue.last_run(RunKind::Embed).await.unwrap().unwrap();
    assert_eq!(run.error.as_deref(), Some("1 of 3 batches failed"));
    assert_eq!(run.failed, 100);
}

#[tokio::test]
async fn rerun_with_nothing_new_embeds_nothing() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    for n in 0..5 {
        drops.seed(stale_drop(n));
    }
    let backend = MockEmbeddingBackend::new().with_dimension(16);
    let runner = embed_runner(&queue, &drops, &backend);

    let first = runner.run_backlog(None).await.unwrap();
    assert_eq!(first.embedded, 5);
    assert_eq!(backend.embed_call_count(), 1);

    let second = runner.run_backlog(None).await.unwrap();
    assert_eq!(second, EmbedOutcome::default());
    assert_eq!(backend.embed_call_count(), 1, "no backend call on rerun");
}

#[tokio::test]
async fn explicit_limit_overrides_the_backlog_cap() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    for n in 0..10 {
        drops.seed(stale_drop(n));
    }
    let backend = MockEmbeddingBackend::new().with_dimension(16);

    let outcome = embed_runner(&queue, &drops, &backend)
        .run_backlog(Some(4))
        .await
        .unwrap();

    assert_eq!(outcome.scanned, 4);
    assert_eq!(outcome.embedded, 4);
    assert_eq!(drops.embedded_count(), 4);
}

// =============================================================================
// WORKER
// =============================================================================

#[tokio::test]
async fn worker_drains_the_queue_and_stops_on_shutdown() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new()
        .with_article("https://worker.test/1", "First", "")
        .with_article("https://worker.test/2", "Second", "");
    let backend = MockEmbeddingBackend::new().with_dimension(16);

    enqueue(&queue, "https://worker.test/1").await;
    enqueue(&queue, "https://worker.test/2").await;

    let worker = IngestWorker::new(
        Arc::new(processor(&queue, &drops, &fetcher)),
        Arc::new(embed_runner(&queue, &drops, &backend)),
        WorkerConfig::default()
            .with_poll_interval(10)
            .with_embed_every(1),
    );

    let handle = worker.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown().await.unwrap();

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.done, 2);
    assert!(backend.embed_call_count() >= 1, "embedder ran at least once");
    assert_eq!(drops.embedded_count(), 2);
}

#[tokio::test]
async fn disabled_worker_never_claims() {
    let queue = InMemoryQueue::default();
    let drops = InMemoryDrops::default();
    let fetcher = MockContentFetcher::new().with_article("https://idle.test/1", "T", "");
    let backend = MockEmbeddingBackend::new().with_dimension(16);

    enqueue(&queue, "https://idle.test/1").await;

    let worker = IngestWorker::new(
        Arc::new(processor(&queue, &drops, &fetcher)),
        Arc::new(embed_runner(&queue, &drops, &backend)),
        WorkerConfig::default().with_enabled(false),
    );

    let handle = worker.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(queue.counts().await.unwrap().pending, 1);
    assert_eq!(fetcher.fetch_call_count(), 0);
    assert_eq!(backend.embed_call_count(), 0);
}

// =============================================================================
// SWEEP
// =============================================================================

#[tokio::test]
async fn sweep_purges_denylisted_terminal_errors() {
    let queue = InMemoryQueue::default();
    for url in [
        "https://spam.example/a",
        "https://spam.example/b",
        "https://ok.example/c",
    ] {
        enqueue(&queue, url).await;
    }
    let claimed = queue.claim_batch(10).await.unwrap();
    for item in &claimed {
        queue.fail_permanent(item.id, "blocked host").await.unwrap();
    }
    assert_eq!(queue.counts().await.unwrap().error, 3);

    let purged = sweep_denylisted(&queue, &["https://SPAM.example/".to_string()])
        .await
        .unwrap();
    assert_eq!(purged, 2);
    assert_eq!(queue.counts().await.unwrap().error, 1);
}

#[tokio::test]
async fn sweep_with_no_usable_hosts_is_a_noop() {
    let queue = InMemoryQueue::default();
    let purged = sweep_denylisted(&queue, &["   ".to_string(), "https://".to_string()])
        .await
        .unwrap();
    assert_eq!(purged, 0);
}
