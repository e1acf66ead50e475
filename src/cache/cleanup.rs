//! Maintenance for the on-disk cache tier.
//!
//! Not triggered by cache writes; runs as an explicit `cache-clean` command.
//! Removes entries older than a maximum age, then evicts oldest-first until
//! the total serialized size fits the byte budget.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::store::{StateStore, StoreResult};

/// What a cleanup pass did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CleanupReport {
    /// Entries removed for exceeding the maximum age (or being unreadable).
    pub expired_removed: usize,
    /// Entries evicted oldest-first to fit the size budget.
    pub size_evicted: usize,
    /// Entries left after the pass.
    pub remaining: usize,
    /// Total serialized bytes left after the pass.
    pub total_bytes: u64,
}

// Only the timestamp matters here; the payload shape varies per cache.
#[derive(Deserialize)]
struct EntryProbe {
    timestamp: DateTime<Utc>,
}

/// Run one cleanup pass over every entry in `store`.
pub async fn cleanup_store(
    store: &dyn StateStore,
    clock: &dyn Clock,
    max_age: StdDuration,
    max_total_bytes: u64,
) -> StoreResult<CleanupReport> {
    let max_age = Duration::from_std(max_age).unwrap_or_else(|_| Duration::hours(2));
    let cutoff = clock.now() - max_age;

    let mut report = CleanupReport::default();
    let mut survivors: Vec<(String, DateTime<Utc>, u64)> = Vec::new();

    for key in store.list_keys().await? {
        let Some(raw) = store.get(&key).await? else {
            continue;
        };
        match serde_json::from_str::<EntryProbe>(&raw) {
            Ok(probe) if probe.timestamp > cutoff => {
                survivors.push((key, probe.timestamp, raw.len() as u64));
            }
            // Too old, or not a cache entry we can date: remove it
            _ => {
                store.remove(&key).await?;
                report.expired_removed += 1;
            }
        }
    }

    // Oldest first, then evict from the front until the budget fits
    survivors.sort_by_key(|(_, timestamp, _)| *timestamp);
    let mut total: u64 = survivors.iter().map(|(_, _, size)| size).sum();

    let mut index = 0;
    while total > max_total_bytes && index < survivors.len() {
        let (key, _, size) = &survivors[index];
        store.remove(key).await?;
        total -= size;
        report.size_evicted += 1;
        index += 1;
    }

    report.remaining = survivors.len() - index;
    report.total_bytes = total;

    info!(
        "cache cleanup: {} expired, {} size-evicted, {} remaining ({} bytes)",
        report.expired_removed, report.size_evicted, report.remaining, report.total_bytes
    );
    Ok(report)
}
