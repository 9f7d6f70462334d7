//! Pure scoring functions for feed ranking.
//!
//! Every function here is deterministic over its inputs: `now` is
//! captured once per ranking pass and threaded through, so a pass
//! scores all candidates against the same clock. Each term is clamped
//! to `[0, 1]` before it enters a weighted blend, which keeps stored
//! garbage (future timestamps, negative source scores, runaway
//! popularity counters) from leaking outside the scale.
//!
//! The base and personalization weights are calibrated values and do
//! not sum to 1 on their own; [`final_score`] is the only place the
//! two blends meet.

use chrono::{DateTime, Duration, Utc};

use dripfeed_core::defaults::{
    BASE_WEIGHT_POPULARITY, BASE_WEIGHT_RECENCY, BASE_WEIGHT_TRUST, FEEDBACK_REASON_THRESHOLD,
    FINAL_WEIGHT_BASE, FINAL_WEIGHT_PERSONAL, FRESH_WINDOW_HOURS, PERSONAL_WEIGHT_FEEDBACK,
    PERSONAL_WEIGHT_SIMILARITY, PERSONAL_WEIGHT_TOPIC, POPULARITY_LOG_CEILING,
    RECENCY_HALF_LIFE_HOURS, REASON_TAG_MAX, TRUST_DEFAULT, TRUST_REASON_THRESHOLD,
};
use dripfeed_core::ContentRecord;

/// All scoring terms for one candidate.
///
/// Kept whole rather than collapsed to the final number so reason
/// assembly and tests can inspect individual terms.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub recency: f64,
    pub trust: f64,
    pub popularity: f64,
    pub base: f64,
    pub topic_match: f64,
    pub similarity: f64,
    pub feedback: f64,
    pub personalization: f64,
    pub final_score: f64,
}

/// Score one candidate against the user's profile state.
pub fn score_candidate(
    drop: &ContentRecord,
    profile: Option<&[f32]>,
    topic_slugs: &[String],
    feedback: f64,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let recency = recency_score(drop.published_at, now);
    let trust = trust_score(drop.authority_score, drop.quality_score);
    let popularity = popularity_score(drop.popularity_score);
    let base = base_score(recency, trust, popularity);

    let topic_match = topic_match_score(&drop.tags, topic_slugs);
    let similarity = similarity_score(profile, drop.embedding.as_ref().map(|v| v.as_slice()));
    let feedback = clamp_unit(feedback);
    let personalization = personalization_score(topic_match, similarity, feedback);

    ScoreBreakdown {
        recency,
        trust,
        popularity,
        base,
        topic_match,
        similarity,
        feedback,
        personalization,
        final_score: final_score(base, personalization),
    }
}

/// Exponential decay over publication age with a half-life of
/// [`RECENCY_HALF_LIFE_HOURS`].
///
/// A drop with no publication timestamp scores 0; one dated in the
/// future clamps to 1 rather than exceeding the scale.
pub fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return 0.0;
    };
    let hours = (now - published).num_seconds() as f64 / 3600.0;
    if hours <= 0.0 {
        return 1.0;
    }
    clamp_unit((-hours * std::f64::consts::LN_2 / RECENCY_HALF_LIFE_HOURS).exp())
}

/// Average of source authority and quality, each falling back to
/// [`TRUST_DEFAULT`] when the source carries no score.
pub fn trust_score(authority: Option<f64>, quality: Option<f64>) -> f64 {
    let authority = clamp_unit(authority.unwrap_or(TRUST_DEFAULT));
    let quality = clamp_unit(quality.unwrap_or(TRUST_DEFAULT));
    (authority + quality) / 2.0
}

/// Log-scaled engagement count, saturating at
/// [`POPULARITY_LOG_CEILING`] raw events.
pub fn popularity_score(raw: Option<f64>) -> f64 {
    let raw = raw.unwrap_or(0.0).max(0.0);
    clamp_unit((1.0 + raw).ln() / POPULARITY_LOG_CEILING.ln())
}

/// Profile-independent blend of recency, trust, and popularity.
pub fn base_score(recency: f64, trust: f64, popularity: f64) -> f64 {
    BASE_WEIGHT_RECENCY * recency + BASE_WEIGHT_TRUST * trust + BASE_WEIGHT_POPULARITY * popularity
}

/// 1.0 when any drop tag matches a followed topic slug, else 0.0.
///
/// A user with no followed topics scores 0 here; the term is absent,
/// not neutral.
pub fn topic_match_score(tags: &[String], topic_slugs: &[String]) -> f64 {
    if matching_topic(tags, topic_slugs).is_some() {
        1.0
    } else {
        0.0
    }
}

/// First followed slug (in follow order) matched by any drop tag,
/// case-insensitive.
pub fn matching_topic<'a>(tags: &[String], topic_slugs: &'a [String]) -> Option<&'a str> {
    topic_slugs
        .iter()
        .find(|slug| tags.iter().any(|tag| tag.eq_ignore_ascii_case(slug)))
        .map(String::as_str)
}

/// Cosine similarity between profile and drop embedding, mapped from
/// `[-1, 1]` to `[0, 1]`.
///
/// A missing profile or embedding (or a dimension mismatch) scores a
/// neutral 0.5 so cold-start users and unembedded drops are neither
/// rewarded nor punished.
pub fn similarity_score(profile: Option<&[f32]>, embedding: Option<&[f32]>) -> f64 {
    match (profile, embedding) {
        (Some(profile), Some(embedding))
            if !profile.is_empty() && profile.len() == embedding.len() =>
        {
            clamp_unit((cosine_similarity(profile, embedding) + 1.0) / 2.0)
        }
        _ => 0.5,
    }
}

/// Cosine similarity in `[-1, 1]`. A zero vector on either side
/// yields 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Profile-dependent blend of topic match, vector similarity, and
/// historical feedback affinity.
pub fn personalization_score(topic_match: f64, similarity: f64, feedback: f64) -> f64 {
    PERSONAL_WEIGHT_TOPIC * topic_match
        + PERSONAL_WEIGHT_SIMILARITY * similarity
        + PERSONAL_WEIGHT_FEEDBACK * clamp_unit(feedback)
}

/// Final blend of the base and personalization scores.
pub fn final_score(base: f64, personalization: f64) -> f64 {
    FINAL_WEIGHT_BASE * base + FINAL_WEIGHT_PERSONAL * personalization
}

/// Assemble at most [`REASON_TAG_MAX`] human-readable reason tags, in
/// presentation priority order: freshness, followed topic, source
/// trust, feedback affinity.
pub fn reason_tags(
    drop: &ContentRecord,
    scores: &ScoreBreakdown,
    topic_slugs: &[String],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut reasons = Vec::new();

    let fresh = drop
        .published_at
        .is_some_and(|p| now - p < Duration::hours(FRESH_WINDOW_HOURS));
    if fresh {
        reasons.push("Fresh content".to_string());
    }
    if let Some(slug) = matching_topic(&drop.tags, topic_slugs) {
        reasons.push(format!("Because you follow {}", slug));
    }
    if scores.trust > TRUST_REASON_THRESHOLD {
        reasons.push("High quality source".to_string());
    }
    if scores.feedback > FEEDBACK_REASON_THRESHOLD {
        reasons.push("Similar content liked before".to_string());
    }

    reasons.truncate(REASON_TAG_MAX);
    reasons
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
