//! Personalization for dripfeed: taste profiles and feed ranking.
//!
//! Two entry points. [`ProfileVectorizer`] folds a user's recent
//! engagement into a unit-length taste vector. [`RankingEngine`] scores
//! the rankable pool against that vector, blends in source trust,
//! recency, popularity, and feedback affinity, then shapes the result
//! for variety. All scoring math lives in pure modules
//! ([`scoring`], [`diversity`]) so the numeric contract is testable
//! without storage or clock control.

pub mod diversity;
pub mod engine;
pub mod profile;
pub mod scoring;

pub use diversity::{diversify, ScoredCandidate};
pub use engine::{RankConfig, RankingEngine};
pub use profile::{aggregate_signals, decayed_weight, ProfileVectorizer};
pub use scoring::{score_candidate, ScoreBreakdown};
