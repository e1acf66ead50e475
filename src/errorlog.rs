//! Append-only bounded error log for post-hoc inspection.
//!
//! Logging must never crash the primary call path: every failure here is
//! swallowed after a warning on stderr.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::Clock;
use crate::config::Mode;
use crate::store::StateStore;

const LOG_KEY: &str = "error_log";

/// One logged failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub details: String,
    pub mode: Mode,
}

/// Bounded JSON error log held in a state store.
pub struct ErrorLog {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    mode: Mode,
    cap: usize,
}

impl ErrorLog {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, mode: Mode, cap: usize) -> Self {
        Self {
            store,
            clock,
            mode,
            cap: cap.max(1),
        }
    }

    /// Append one entry, truncating the log to the most recent `cap` entries.
    pub async fn append(&self, error_type: &str, details: &str) {
        let mut entries = self.read_all().await;
        entries.push(ErrorRecord {
            timestamp: self.clock.now(),
            error_type: error_type.to_string(),
            details: details.to_string(),
            mode: self.mode,
        });
        if entries.len() > self.cap {
            let excess = entries.len() - self.cap;
            entries.drain(..excess);
        }

        match serde_json::to_string(&entries) {
            Ok(raw) => {
                if let Err(e) = self.store.set(LOG_KEY, &raw).await {
                    warn!("cannot persist error log: {e}");
                }
            }
            Err(e) => warn!("cannot serialize error log: {e}"),
        }
    }

    /// The most recent `n` entries, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        let entries = self.read_all().await;
        let skip = entries.len().saturating_sub(n);
        entries.into_iter().skip(skip).collect()
    }

    async fn read_all(&self) -> Vec<ErrorRecord> {
        match self.store.get(LOG_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("error log unreadable, starting fresh: {e}");
                Vec::new()
            }
        }
    }
}
