//! Denylist sweep for the ingest queue.
//!
//! Maintenance operation: terminal-error items from hosts that were
//! denylisted after the fact are deleted rather than left to clutter the
//! error backlog.

use tracing::info;

use dripfeed_core::{QueueRepository, Result};

/// Normalize a host denylist for matching.
///
/// Accepts bare hosts as well as pasted URLs: schemes and trailing
/// slashes are stripped, hosts lowercased, empties dropped, duplicates
/// removed while preserving order.
pub fn normalize_hosts(hosts: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(hosts.len());
    for raw in hosts {
        let host = raw.trim();
        let host = host
            .strip_prefix("https://")
            .or_else(|| host.strip_prefix("http://"))
            .unwrap_or(host);
        let host = host.trim_end_matches('/').to_ascii_lowercase();
        if host.is_empty() || normalized.contains(&host) {
            continue;
        }
        normalized.push(host);
    }
    normalized
}

/// Delete terminal-error queue items whose URL host is denylisted.
/// Returns the number of items purged.
pub async fn sweep_denylisted(queue: &dyn QueueRepository, hosts: &[String]) -> Result<u64> {
    let hosts = normalize_hosts(hosts);
    if hosts.is_empty() {
        return Ok(0);
    }

    let purged = queue.purge_denylisted(&hosts).await?;
    if purged > 0 {
        info!(purged, hosts = ?hosts, "Purged denylisted queue items");
    }
    Ok(purged)
}
