//! Personalized feed ranking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use dripfeed_core::defaults::{
    FEEDBACK_CONCURRENCY, FEEDBACK_TIMEOUT_MS, RANK_POOL_SIZE, RANK_POOL_WINDOW_DAYS,
};
use dripfeed_core::{
    ContentRecord, DropRepository, DropType, FeedbackScorer, ProfileRepository, RankedCandidate,
};

use crate::diversity::{diversify, ScoredCandidate};
use crate::scoring::{reason_tags, score_candidate};

/// Tuning knobs for a ranking pass.
#[derive(Debug, Clone)]
pub struct RankConfig {
    /// Candidate pool cap per pass.
    pub pool_size: i64,
    /// Publication window for the candidate pool, in days.
    pub pool_window_days: i64,
    /// Concurrent feedback scorer lookups.
    pub feedback_concurrency: usize,
    /// Deadline for a single feedback lookup.
    pub feedback_timeout: Duration,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            pool_size: RANK_POOL_SIZE,
            pool_window_days: RANK_POOL_WINDOW_DAYS,
            feedback_concurrency: FEEDBACK_CONCURRENCY,
            feedback_timeout: Duration::from_millis(FEEDBACK_TIMEOUT_MS),
        }
    }
}

impl RankConfig {
    pub fn with_pool_size(mut self, pool_size: i64) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_pool_window_days(mut self, days: i64) -> Self {
        self.pool_window_days = days;
        self
    }

    pub fn with_feedback_concurrency(mut self, concurrency: usize) -> Self {
        self.feedback_concurrency = concurrency.max(1);
        self
    }

    pub fn with_feedback_timeout(mut self, timeout: Duration) -> Self {
        self.feedback_timeout = timeout;
        self
    }
}

/// Scores and shapes a personalized feed from the rankable pool.
pub struct RankingEngine {
    drops: Arc<dyn DropRepository>,
    profiles: Arc<dyn ProfileRepository>,
    feedback: Arc<dyn FeedbackScorer>,
    config: RankConfig,
}

impl RankingEngine {
    pub fn new(
        drops: Arc<dyn DropRepository>,
        profiles: Arc<dyn ProfileRepository>,
        feedback: Arc<dyn FeedbackScorer>,
        config: RankConfig,
    ) -> Self {
        Self {
            drops,
            profiles,
            feedback,
            config,
        }
    }

    /// Rank a feed of at most `limit` drops for one user.
    ///
    /// Never fails: a broken dependency degrades the term it feeds (or
    /// empties the pool) with a WARN log, and the caller always gets a
    /// list. `now` is captured once so every candidate is scored
    /// against the same clock.
    #[instrument(skip(self), fields(subsystem = "rank", component = "engine", op = "rank"))]
    pub async fn rank(&self, user_id: Uuid, limit: usize) -> Vec<RankedCandidate> {
        let now = Utc::now();
        let published_since = now - ChronoDuration::days(self.config.pool_window_days);

        let pool = match self.drops.rankable(published_since, self.config.pool_size).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "Candidate pool query failed, serving an empty feed");
                return Vec::new();
            }
        };
        if pool.is_empty() {
            debug!(%user_id, "Candidate pool is empty");
            return Vec::new();
        }

        let profile = match self.profiles.get(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(%user_id, error = %e, "Profile lookup failed, ranking without similarity");
                None
            }
        };
        let topic_slugs = match self.profiles.topic_slugs(user_id).await {
            Ok(slugs) => slugs,
            Err(e) => {
                warn!(%user_id, error = %e, "Topic lookup failed, ranking without topics");
                Vec::new()
            }
        };

        let feedback_scores = self.feedback_scores(user_id, &pool).await;
        let profile_components = profile.as_ref().map(|p| p.vector.as_slice());

        let mut scored: Vec<ScoredCandidate> = pool
            .iter()
            .zip(feedback_scores)
            .map(|(drop, feedback)| {
                let breakdown =
                    score_candidate(drop, profile_components, &topic_slugs, feedback, now);
                let reasons = reason_tags(drop, &breakdown, &topic_slugs, now);
                ScoredCandidate {
                    drop_id: drop.id,
                    source_id: drop.source_id,
                    sponsored: drop.sponsored,
                    video: drop.content_type == DropType::Video,
                    final_score: breakdown.final_score,
                    reason_tags: reasons,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.drop_id.cmp(&b.drop_id))
        });

        let selected = diversify(scored, limit);
        debug!(
            %user_id,
            pool_size = pool.len(),
            selected = selected.len(),
            "Feed ranked"
        );

        selected
            .into_iter()
            .map(|c| RankedCandidate {
                drop_id: c.drop_id,
                final_score: c.final_score,
                reason_tags: c.reason_tags,
            })
            .collect()
    }

    /// Feedback affinity for every pool drop, in pool order.
    ///
    /// Lookups run concurrently up to the configured bound, each under
    /// its own deadline. A failed or slow lookup scores 0.0.
    async fn feedback_scores(&self, user_id: Uuid, pool: &[ContentRecord]) -> Vec<f64> {
        let timeout = self.config.feedback_timeout;
        // Materialized before `stream::iter` so the map closure does not
        // become part of the future's state (rust-lang/rust#89976).
        let lookups: Vec<_> = pool
            .iter()
            .map(|drop| {
                let feedback = Arc::clone(&self.feedback);
                async move {
                    match tokio::time::timeout(timeout, feedback.score(user_id, drop)).await {
                        Ok(Ok(score)) => score,
                        Ok(Err(e)) => {
                            warn!(drop_id = %drop.id, error = %e, "Feedback lookup failed, scoring 0");
                            0.0
                        }
                        Err(_) => {
                            warn!(drop_id = %drop.id, "Feedback lookup timed out, scoring 0");
                            0.0
                        }
                    }
                }
            })
            .collect();
        stream::iter(lookups)
            .buffered(self.config.feedback_concurrency.max(1))
            .collect()
            .await
    }
}
