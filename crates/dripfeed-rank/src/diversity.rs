//! Feed diversity pass.
//!
//! Runs after scoring, on a list already sorted by final score. The
//! pass trades a little score for variety: one guaranteed video slot,
//! a per-source cap, a sponsored cap, and an exploration backfill that
//! surfaces sources the scan passed over. Output order is acceptance
//! order, so the reserved video leads the feed and exploration picks
//! trail it.

use std::collections::HashMap;

use uuid::Uuid;

use dripfeed_core::defaults::{RANK_SOURCE_CAP, RANK_SPONSORED_CAP, REASON_TAG_MAX};

/// A scored candidate as the diversity pass consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub drop_id: Uuid,
    pub source_id: Option<Uuid>,
    pub sponsored: bool,
    pub video: bool,
    pub final_score: f64,
    pub reason_tags: Vec<String>,
}

/// Shape a score-sorted candidate list into the final feed.
///
/// Selection rules, applied in order:
/// 1. The highest-scoring video, if any, is accepted first regardless
///    of its rank.
/// 2. A greedy scan in score order skips candidates whose source
///    already holds [`RANK_SOURCE_CAP`] slots (candidates without a
///    source are never capped) and sponsored candidates once
///    [`RANK_SPONSORED_CAP`] is reached.
/// 3. If room remains, a second scan over the skipped candidates
///    admits drops from sources not yet represented, tagged with a
///    leading "Exploration" reason. Only source novelty gates this
///    scan; the sponsored cap does not apply to it.
/// 4. The result is truncated to `limit`.
pub fn diversify(candidates: Vec<ScoredCandidate>, limit: usize) -> Vec<ScoredCandidate> {
    if limit == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let mut accepted: Vec<ScoredCandidate> = Vec::with_capacity(limit.min(candidates.len()));
    let mut taken = vec![false; candidates.len()];
    let mut per_source: HashMap<Uuid, usize> = HashMap::new();
    let mut sponsored_taken = 0usize;

    // The input is sorted, so the first video is the best one.
    if let Some(idx) = candidates.iter().position(|c| c.video) {
        let video = candidates[idx].clone();
        if let Some(source) = video.source_id {
            *per_source.entry(source).or_insert(0) += 1;
        }
        if video.sponsored {
            sponsored_taken += 1;
        }
        taken[idx] = true;
        accepted.push(video);
    }

    for (idx, candidate) in candidates.iter().enumerate() {
        if accepted.len() >= limit {
            break;
        }
        if taken[idx] {
            continue;
        }
        if candidate.sponsored && sponsored_taken >= RANK_SPONSORED_CAP {
            continue;
        }
        if let Some(source) = candidate.source_id {
            if per_source.get(&source).copied().unwrap_or(0) >= RANK_SOURCE_CAP {
                continue;
            }
            *per_source.entry(source).or_insert(0) += 1;
        }
        if candidate.sponsored {
            sponsored_taken += 1;
        }
        taken[idx] = true;
        accepted.push(candidate.clone());
    }

    if accepted.len() < limit {
        for (idx, candidate) in candidates.iter().enumerate() {
            if accepted.len() >= limit {
                break;
            }
            if taken[idx] {
                continue;
            }
            let Some(source) = candidate.source_id else {
                continue;
            };
            if per_source.contains_key(&source) {
                continue;
            }

            let mut explored = candidate.clone();
            explored.reason_tags.insert(0, "Exploration".to_string());
            explored.reason_tags.truncate(REASON_TAG_MAX);
            per_source.insert(source, 1);
            taken[idx] = true;
            accepted.push(explored);
        }
    }

    accepted.truncate(limit);
    accepted
}
