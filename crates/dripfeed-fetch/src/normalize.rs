//! URL normalization and deduplication hashing.
//!
//! Every URL entering the pipeline passes through [`normalize_url`] before
//! anything else looks at it. Two spellings of the same page (tracking
//! params, fragment, shuffled query order, default port) must normalize to
//! the same string so that [`url_hash`] dedups them to a single drop.

use sha2::{Digest, Sha256};
use url::Url;

use dripfeed_core::{Error, Result};

/// Query parameters that identify a click, not a page.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "ref"];

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Canonicalize a URL for deduplication.
///
/// Rejects anything that is not absolute http(s). Lowercases scheme and
/// host, strips the fragment, drops default ports, removes tracking
/// parameters, sorts the surviving query pairs, and trims the trailing
/// slash from non-root paths. The result is stable: normalizing twice
/// yields the same string.
pub fn normalize_url(raw: &str) -> Result<String> {
    let mut url =
        Url::parse(raw.trim()).map_err(|e| Error::InvalidInput(format!("Invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidInput(format!(
                "Unsupported URL scheme: {}",
                other
            )));
        }
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    Ok(url.to_string())
}

/// Hex-encoded SHA-256 of a normalized URL. This is the dedup key for
/// content drops; always hash the output of [`normalize_url`], never the
/// raw input.
pub fn url_hash(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Normalize a raw URL and compute its dedup hash in one step.
pub fn normalize_and_hash(raw: &str) -> Result<(String, String)> {
    let normalized = normalize_url(raw)?;
    let hash = url_hash(&normalized);
    Ok((normalized, hash))
}
