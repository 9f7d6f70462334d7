//! # dripfeed-fetch
//!
//! URL normalization and HTTP content fetching for the dripfeed pipeline.
//!
//! [`normalize_url`] canonicalizes incoming URLs so duplicates collapse to
//! one [`url_hash`] dedup key; [`HttpContentFetcher`] turns a URL into
//! extracted drop metadata; [`MockContentFetcher`] stands in for it in
//! tests.

pub mod http;
pub mod mock;
pub mod normalize;

pub use http::HttpContentFetcher;
pub use mock::MockContentFetcher;
pub use normalize::{normalize_and_hash, normalize_url, url_hash};

// Re-export the trait and payload type so fetch callers need only this crate.
pub use dripfeed_core::{ContentFetcher, FetchedContent};
