//! Two-tier TTL cache: process memory in front of a state store.
//!
//! Lookups hit the in-process map first, then the store; a store hit is
//! promoted into memory. Entries past the TTL are treated as absent and
//! evicted lazily from whichever tier held them (same promotion shape as a
//! hot/warm storage chain).

mod cleanup;

pub use cleanup::{cleanup_store, CleanupReport};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::store::StateStore;

const KEY_SLUG_MAX: usize = 48;

/// Normalized cache key. Requests differing only in keyword casing or
/// surrounding whitespace collide into the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a keyword search with a result-count limit.
    pub fn search(keyword: &str, limit: usize) -> Self {
        Self::scoped("search", &keyword.trim().to_lowercase(), limit)
    }

    /// Key for a URL deep-link conversion. URLs keep their case; only
    /// whitespace is stripped.
    pub fn deeplink(url: &str) -> Self {
        Self::scoped("deeplink", url.trim(), 0)
    }

    /// Build a store-safe key. Values that are short plain ASCII stay
    /// readable; anything else gets a stable hash suffix so distinct values
    /// never collide after slugging.
    fn scoped(scope: &str, value: &str, limit: usize) -> Self {
        let safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        let needs_hash = value.is_empty()
            || value.len() > KEY_SLUG_MAX
            || value.chars().any(|c| !safe(c));

        let slug: String = value
            .chars()
            .take(KEY_SLUG_MAX)
            .map(|c| if safe(c) { c } else { '_' })
            .collect();

        if needs_hash {
            let digest = Sha256::digest(value.as_bytes());
            Self(format!("{scope}_{slug}-{}_{limit}", hex::encode(&digest[..6])))
        } else {
            Self(format!("{scope}_{slug}_{limit}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One cached payload with its insertion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    timestamp: DateTime<Utc>,
}

/// Two-tier cache over any serializable payload.
pub struct TieredCache<T> {
    memory: RwLock<HashMap<String, CacheEntry<T>>>,
    disk: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<T> TieredCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(disk: Arc<dyn StateStore>, clock: Arc<dyn Clock>, ttl: StdDuration) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1));
        Self {
            memory: RwLock::new(HashMap::new()),
            disk,
            clock,
            ttl,
        }
    }

    /// Look up a fresh entry, promoting store hits into memory. Expired
    /// entries are evicted from the tier that held them and reported as a
    /// miss. Store read failures are also a miss, never an error.
    pub async fn get(&self, key: &CacheKey) -> Option<T> {
        // Memory tier
        let stale_in_memory = {
            let memory = self.memory.read().await;
            match memory.get(key.as_str()) {
                Some(entry) if self.is_fresh(entry) => {
                    debug!("cache hit (memory): {}", key.as_str());
                    return Some(entry.data.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        // Evict the stale entry outside the read lock, rechecking freshness
        // since a writer may have refreshed it in between
        if stale_in_memory {
            let mut memory = self.memory.write().await;
            if let Some(entry) = memory.get(key.as_str()) {
                if !self.is_fresh(entry) {
                    memory.remove(key.as_str());
                }
            }
        }

        // Store tier
        let raw = match self.disk.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!("cache store read failed for {}: {e}", key.as_str());
                return None;
            }
        };
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("cache entry unparseable for {}: {e}", key.as_str());
                let _ = self.disk.remove(key.as_str()).await;
                return None;
            }
        };

        if self.is_fresh(&entry) {
            debug!("cache hit (disk): {}", key.as_str());
            let data = entry.data.clone();
            let mut memory = self.memory.write().await;
            memory.insert(key.as_str().to_string(), entry);
            Some(data)
        } else {
            let _ = self.disk.remove(key.as_str()).await;
            None
        }
    }

    /// Write through to both tiers, each stamped with the current time.
    /// Store write failures degrade to memory-only caching.
    pub async fn set(&self, key: &CacheKey, data: T) {
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now(),
        };

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(e) = self.disk.set(key.as_str(), &raw).await {
                    warn!("cache store write failed for {}: {e}", key.as_str());
                }
            }
            Err(e) => warn!("cannot serialize cache entry for {}: {e}", key.as_str()),
        }

        let mut memory = self.memory.write().await;
        memory.insert(key.as_str().to_string(), entry);
    }

    /// Number of entries currently in the memory tier (fresh or not).
    pub async fn memory_len(&self) -> usize {
        self.memory.read().await.len()
    }

    fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        self.clock.now() - entry.timestamp < self.ttl
    }
}
