//! Rate-limit-aware orchestration over a provider client.
//!
//! Every operation runs the same lifecycle: consult the cache, check the
//! local call budget, record the outbound call, dispatch, then either cache
//! the result or log the failure and report how long to stay away.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{CacheKey, TieredCache};
use crate::clock::Clock;
use crate::config::{Settings, PROVIDER_HOURLY_QUOTA};
use crate::errorlog::ErrorLog;
use crate::models::ProductRecord;
use crate::providers::{ProviderClient, ProviderError};
use crate::quota::{BackoffPolicy, UsageTracker};
use crate::store::StateStore;

/// Store key holding the consecutive rate-limit failure count.
const ATTEMPTS_KEY: &str = "rate_limit_attempts";

/// Errors surfaced to the caller of a guarded operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("hourly call budget reached ({count}/{threshold}); try again later")]
    QuotaExceeded { count: usize, threshold: usize },
    #[error("provider rate limited (attempt {attempt}); retry after {retry_after:?}")]
    RateLimited { attempt: u32, retry_after: Duration },
    #[error(transparent)]
    Provider(ProviderError),
}

/// A successful result, tagged with whether it was served from cache.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub data: T,
    pub from_cache: bool,
}

/// Provider client wrapped with quota tracking, tiered caching, backoff
/// accounting, and error logging.
pub struct SafeApiClient {
    provider: Box<dyn ProviderClient>,
    search_cache: TieredCache<Vec<ProductRecord>>,
    link_cache: TieredCache<String>,
    usage: UsageTracker,
    backoff: BackoffPolicy,
    errors: ErrorLog,
    state: Arc<dyn StateStore>,
}

impl SafeApiClient {
    pub fn new(
        provider: Box<dyn ProviderClient>,
        settings: &Settings,
        state: Arc<dyn StateStore>,
        cache: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::from_secs(settings.cache.ttl_secs);
        let window = Duration::from_secs(settings.quota.window_secs);
        Self {
            provider,
            search_cache: TieredCache::new(cache.clone(), clock.clone(), ttl),
            link_cache: TieredCache::new(cache, clock.clone(), ttl),
            usage: UsageTracker::new(state.clone(), clock.clone(), settings.mode, window),
            backoff: BackoffPolicy::for_mode(settings.mode),
            errors: ErrorLog::new(state.clone(), clock, settings.mode, settings.error_log_cap),
            state,
        }
    }

    /// Keyword search, served from cache when fresh.
    pub async fn search(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Outcome<Vec<ProductRecord>>, ApiError> {
        let key = CacheKey::search(keyword, limit);
        if let Some(products) = self.search_cache.get(&key).await {
            debug!("search cache hit for {:?}", key.as_str());
            return Ok(Outcome {
                data: products,
                from_cache: true,
            });
        }

        self.check_budget().await?;
        let result = self.provider.search(keyword, limit).await;
        let products = self.settle(result).await?;
        self.search_cache.set(&key, products.clone()).await;
        Ok(Outcome {
            data: products,
            from_cache: false,
        })
    }

    /// Deep link generation, served from cache when fresh.
    pub async fn deeplink(&self, url: &str) -> Result<Outcome<String>, ApiError> {
        let key = CacheKey::deeplink(url);
        if let Some(link) = self.link_cache.get(&key).await {
            debug!("deeplink cache hit for {:?}", key.as_str());
            return Ok(Outcome {
                data: link,
                from_cache: true,
            });
        }

        self.check_budget().await?;
        let result = self.provider.deeplink(url).await;
        let link = self.settle(result).await?;
        self.link_cache.set(&key, link.clone()).await;
        Ok(Outcome {
            data: link,
            from_cache: false,
        })
    }

    /// Calls made in the trailing window.
    pub async fn usage_count(&self) -> usize {
        self.usage.current_count().await
    }

    pub fn usage_threshold(&self) -> usize {
        self.usage.threshold()
    }

    /// Refuse before dispatch when the local budget is spent, then record
    /// the call we are about to make.
    async fn check_budget(&self) -> Result<(), ApiError> {
        if !self.usage.can_call().await {
            let count = self.usage.current_count().await;
            let threshold = self.usage.threshold();
            self.errors
                .append(
                    "quota_exceeded",
                    &format!(
                        "{count} calls in window, threshold {threshold}, provider quota {PROVIDER_HOURLY_QUOTA}"
                    ),
                )
                .await;
            return Err(ApiError::QuotaExceeded { count, threshold });
        }
        self.usage.record_call().await;
        Ok(())
    }

    /// Convert a provider result into an [`ApiError`], updating the
    /// consecutive-failure counter along the way.
    async fn settle<T>(&self, result: Result<T, ProviderError>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.reset_attempts().await;
                Ok(value)
            }
            Err(ProviderError::RateLimited) => {
                let attempt = self.bump_attempts().await;
                let retry_after = self.backoff.delay_for(attempt);
                warn!(
                    "rate limited by {} (attempt {attempt}), retry after {retry_after:?}",
                    self.provider.platform()
                );
                self.errors
                    .append(
                        "rate_limited",
                        &format!("attempt {attempt}, retry after {}s", retry_after.as_secs()),
                    )
                    .await;
                Err(ApiError::RateLimited {
                    attempt,
                    retry_after,
                })
            }
            Err(error) => {
                self.errors.append("provider_error", &error.to_string()).await;
                Err(ApiError::Provider(error))
            }
        }
    }

    async fn bump_attempts(&self) -> u32 {
        let attempt = self.load_attempts().await.saturating_add(1);
        if let Err(error) = self.state.set(ATTEMPTS_KEY, &attempt.to_string()).await {
            warn!("failed to persist rate-limit attempt count: {error}");
        }
        attempt
    }

    async fn reset_attempts(&self) {
        if self.load_attempts().await == 0 {
            return;
        }
        if let Err(error) = self.state.remove(ATTEMPTS_KEY).await {
            warn!("failed to clear rate-limit attempt count: {error}");
        }
    }

    /// Unreadable or corrupt counters count as zero.
    async fn load_attempts(&self) -> u32 {
        match self.state.get(ATTEMPTS_KEY).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or(0),
            Ok(None) => 0,
            Err(error) => {
                warn!("failed to read rate-limit attempt count: {error}");
                0
            }
        }
    }
}
