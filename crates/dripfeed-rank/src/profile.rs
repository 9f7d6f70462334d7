//! User taste profile vectorization.
//!
//! A profile vector is the decay-weighted aggregate of the embeddings
//! a user engaged with inside the signal window. Aggregation is a pure
//! function of the signals and the clock, so one user's refresh is
//! reproducible and testable without storage.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use dripfeed_core::defaults::{PROFILE_DECAY_DAYS, PROFILE_MIN_WEIGHT, PROFILE_WINDOW_DAYS};
use dripfeed_core::{
    EngagementAction, EngagementRepository, EngagementSignal, ProfileRepository, ProfileVector,
    Result, Vector,
};

/// Rebuilds user taste vectors from recent engagement.
pub struct ProfileVectorizer {
    engagements: Arc<dyn EngagementRepository>,
    profiles: Arc<dyn ProfileRepository>,
}

impl ProfileVectorizer {
    pub fn new(
        engagements: Arc<dyn EngagementRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            engagements,
            profiles,
        }
    }

    /// Recompute and store the taste vector for one user.
    ///
    /// Returns `Ok(None)` without touching the stored profile when the
    /// user has no qualifying signal: nothing in the window, or every
    /// contribution decayed below [`PROFILE_MIN_WEIGHT`]. Otherwise the
    /// stored profile is overwritten whole.
    #[instrument(skip(self), fields(subsystem = "rank", component = "profile", op = "refresh_profile"))]
    pub async fn refresh_profile(&self, user_id: Uuid) -> Result<Option<ProfileVector>> {
        let now = Utc::now();
        let since = now - Duration::days(PROFILE_WINDOW_DAYS);
        let signals = self.engagements.recent_signals(user_id, since).await?;

        let Some(components) = aggregate_signals(&signals, now) else {
            debug!(
                %user_id,
                signal_count = signals.len(),
                "No qualifying engagement, profile left untouched"
            );
            return Ok(None);
        };

        let profile = self.profiles.upsert(user_id, &Vector::from(components)).await?;
        info!(%user_id, signal_count = signals.len(), "Profile vector refreshed");
        Ok(Some(profile))
    }
}

/// Effective weight of one engagement: the action weight scaled by
/// exponential age decay with a time constant of
/// [`PROFILE_DECAY_DAYS`].
pub fn decayed_weight(
    action: EngagementAction,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let age_days = ((now - created_at).num_seconds() as f64 / 86_400.0).max(0.0);
    action.weight() * (-age_days / PROFILE_DECAY_DAYS).exp()
}

/// Aggregate engagement signals into a unit-length taste vector.
///
/// Each signal contributes its drop embedding scaled by
/// [`decayed_weight`]; contributions with an absolute weight below
/// [`PROFILE_MIN_WEIGHT`] are dropped. The weighted sum is divided by
/// the sum of absolute weights (so opposing signals cannot blow up the
/// normalizer) and then L2-normalized.
///
/// Returns `None` when no contribution qualifies, or when the
/// qualifying contributions cancel to a zero vector.
pub fn aggregate_signals(signals: &[EngagementSignal], now: DateTime<Utc>) -> Option<Vec<f32>> {
    let mut sum: Vec<f64> = Vec::new();
    let mut total_weight = 0.0f64;

    for signal in signals {
        let weight = decayed_weight(signal.action, signal.created_at, now);
        if weight.abs() < PROFILE_MIN_WEIGHT {
            continue;
        }

        let embedding = signal.embedding.as_slice();
        if embedding.is_empty() {
            continue;
        }
        if sum.is_empty() {
            sum = vec![0.0; embedding.len()];
        } else if sum.len() != embedding.len() {
            // Stray row from an older embedding model; cannot mix.
            continue;
        }

        for (acc, component) in sum.iter_mut().zip(embedding) {
            *acc += weight * f64::from(*component);
        }
        total_weight += weight.abs();
    }

    if sum.is_empty() || total_weight <= 0.0 {
        return None;
    }

    for component in &mut sum {
        *component /= total_weight;
    }

    let norm = sum.iter().map(|c| c * c).sum::<f64>().sqrt();
    if norm <= f64::EPSILON {
        return None;
    }

    Some(sum.into_iter().map(|c| (c / norm) as f32).collect())
}
