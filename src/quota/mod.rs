//! Sliding-window usage tracking for provider call quotas.
//!
//! Each outbound call appends a timestamp to a persisted sequence; the count
//! of timestamps inside the trailing window decides whether another call may
//! be dispatched. The sequence is pruned on every read, so the persisted file
//! stays bounded by the window.

mod backoff;

pub use backoff::BackoffPolicy;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::Mode;
use crate::store::StateStore;

const USAGE_KEY: &str = "usage_history";

/// Tracks outbound calls inside a trailing window against a mode-dependent
/// threshold.
///
/// A missing or corrupt history fails open: it resets to zero usage rather
/// than blocking all calls on bad state.
pub struct UsageTracker {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    mode: Mode,
    window: Duration,
}

impl UsageTracker {
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        mode: Mode,
        window: StdDuration,
    ) -> Self {
        let window =
            Duration::from_std(window).unwrap_or_else(|_| Duration::hours(1));
        Self {
            store,
            clock,
            mode,
            window,
        }
    }

    /// Record one outbound call and return the trailing-window count
    /// including it.
    pub async fn record_call(&self) -> usize {
        let mut history = self.load_history().await;
        history.push(self.clock.now());
        self.prune(&mut history);
        self.persist(&history).await;
        history.len()
    }

    /// Count of calls inside the trailing window, without recording one.
    pub async fn current_count(&self) -> usize {
        let mut history = self.load_history().await;
        let before = history.len();
        self.prune(&mut history);
        if history.len() != before {
            self.persist(&history).await;
        }
        history.len()
    }

    /// Whether another call may be dispatched right now.
    pub async fn can_call(&self) -> bool {
        self.current_count().await < self.threshold()
    }

    /// The local dispatch threshold for the configured mode.
    pub fn threshold(&self) -> usize {
        self.mode.call_threshold()
    }

    fn prune(&self, history: &mut Vec<DateTime<Utc>>) {
        let cutoff = self.clock.now() - self.window;
        history.retain(|t| *t > cutoff);
    }

    async fn load_history(&self) -> Vec<DateTime<Utc>> {
        match self.store.get(USAGE_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("usage history unparseable, resetting to empty: {e}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("usage history unreadable, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    async fn persist(&self, history: &[DateTime<Utc>]) {
        let raw = match serde_json::to_string(history) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cannot serialize usage history: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(USAGE_KEY, &raw).await {
            warn!("cannot persist usage history: {e}");
        } else {
            debug!("usage history: {} calls in window", history.len());
        }
    }
}
