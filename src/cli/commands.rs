//! Command definitions and dispatch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use crate::api::{ApiError, SafeApiClient};
use crate::cache;
use crate::clock::{Clock, SystemClock};
use crate::config::{self, Settings};
use crate::errorlog::ErrorLog;
use crate::models::{Platform, ProductDisplay};
use crate::providers::{self, HttpTransport, Transport};
use crate::quota::UsageTracker;
use crate::store::{FileStore, StateStore};

use super::output::Envelope;

#[derive(Parser)]
#[command(
    name = "affiliget",
    version,
    about = "Rate-limit-aware affiliate product search and deep links"
)]
struct Cli {
    /// Data directory (config, state, cache)
    #[arg(long, global = true, env = "AFFILIGET_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search products by keyword
    Search {
        /// Platform: coupang or aliexpress
        platform: String,
        /// Search keyword
        keyword: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// On a provider rate limit, wait out the backoff delay and retry once
        #[arg(long)]
        retry: bool,
    },
    /// Convert a product URL into a tracked affiliate deep link
    Deeplink {
        /// Platform: coupang or aliexpress
        platform: String,
        /// Product URL
        url: String,
        /// On a provider rate limit, wait out the backoff delay and retry once
        #[arg(long)]
        retry: bool,
    },
    /// Show call usage, recent errors, and cache occupancy
    Status,
    /// Remove expired and oversized entries from the disk cache
    CacheClean {
        /// Override the maximum entry age in seconds
        #[arg(long)]
        max_age_secs: Option<u64>,
        /// Override the total size budget in bytes
        #[arg(long)]
        max_total_bytes: Option<u64>,
    },
    /// Write a template config file
    Init,
}

/// Parse argv, dispatch, print the result envelope, return the exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    if cli.verbose {
        tracing::debug!("data directory: {}", data_dir.display());
    }

    let envelope = match dispatch(cli.command, &data_dir).await {
        Ok(envelope) => envelope,
        Err(error) => Envelope::err(format!("{error:#}")),
    };

    envelope.emit();
    if envelope.success {
        0
    } else {
        1
    }
}

async fn dispatch(command: Commands, data_dir: &std::path::Path) -> Result<Envelope> {
    match command {
        Commands::Search {
            platform,
            keyword,
            limit,
            retry,
        } => {
            let platform: Platform = platform.parse()?;
            let client = build_client(platform, data_dir)?;
            search(&client, &keyword, limit, retry).await
        }
        Commands::Deeplink {
            platform,
            url,
            retry,
        } => {
            let platform: Platform = platform.parse()?;
            // Reject malformed URLs before spending a budgeted call.
            url::Url::parse(&url).with_context(|| format!("invalid product URL {url:?}"))?;
            let client = build_client(platform, data_dir)?;
            deeplink(&client, &url, retry).await
        }
        Commands::Status => status(data_dir).await,
        Commands::CacheClean {
            max_age_secs,
            max_total_bytes,
        } => cache_clean(data_dir, max_age_secs, max_total_bytes).await,
        Commands::Init => init(data_dir),
    }
}

/// Wire up the full client stack for one platform.
fn build_client(platform: Platform, data_dir: &std::path::Path) -> Result<SafeApiClient> {
    let settings = Settings::load(data_dir).context("failed to load configuration")?;

    let state: Arc<dyn StateStore> = Arc::new(
        FileStore::open(config::state_dir(data_dir)).context("failed to open state directory")?,
    );
    let cache: Arc<dyn StateStore> = Arc::new(
        FileStore::open(config::cache_dir(data_dir)).context("failed to open cache directory")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(settings.http_timeout()).context("failed to build HTTP client")?,
    );

    let provider = providers::client_for(platform, &settings, transport, clock.clone())?;
    Ok(SafeApiClient::new(provider, &settings, state, cache, clock))
}

async fn search(
    client: &SafeApiClient,
    keyword: &str,
    limit: usize,
    retry: bool,
) -> Result<Envelope> {
    let outcome = match client.search(keyword, limit).await {
        Ok(outcome) => outcome,
        Err(ApiError::RateLimited { attempt, retry_after }) if retry => {
            info!("waiting {retry_after:?} before retrying (attempt {attempt})");
            tokio::time::sleep(retry_after).await;
            client.search(keyword, limit).await?
        }
        Err(error) => return Err(error.into()),
    };

    let products: Vec<ProductDisplay> = outcome.data.into_iter().map(Into::into).collect();
    Ok(Envelope::ok(json!({
        "keyword": keyword,
        "count": products.len(),
        "from_cache": outcome.from_cache,
        "products": products,
    })))
}

async fn deeplink(client: &SafeApiClient, url: &str, retry: bool) -> Result<Envelope> {
    let outcome = match client.deeplink(url).await {
        Ok(outcome) => outcome,
        Err(ApiError::RateLimited { attempt, retry_after }) if retry => {
            info!("waiting {retry_after:?} before retrying (attempt {attempt})");
            tokio::time::sleep(retry_after).await;
            client.deeplink(url).await?
        }
        Err(error) => return Err(error.into()),
    };

    Ok(Envelope::ok(json!({
        "original_url": url,
        "affiliate_url": outcome.data,
        "from_cache": outcome.from_cache,
    })))
}

/// Status needs no credentials; it reads local state only.
async fn status(data_dir: &std::path::Path) -> Result<Envelope> {
    let settings = Settings::load(data_dir).context("failed to load configuration")?;

    let state: Arc<dyn StateStore> = Arc::new(
        FileStore::open(config::state_dir(data_dir)).context("failed to open state directory")?,
    );
    let cache_store =
        FileStore::open(config::cache_dir(data_dir)).context("failed to open cache directory")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let usage = UsageTracker::new(
        state.clone(),
        clock.clone(),
        settings.mode,
        settings.quota.window(),
    );
    let errors = ErrorLog::new(state, clock, settings.mode, settings.error_log_cap);

    let calls = usage.current_count().await;
    let recent_errors = errors.recent(5).await;
    let cached_entries = cache_store.list_keys().await?.len();

    Ok(Envelope::ok(json!({
        "mode": settings.mode,
        "calls_last_hour": calls,
        "call_threshold": usage.threshold(),
        "provider_quota": config::PROVIDER_HOURLY_QUOTA,
        "cached_entries": cached_entries,
        "recent_errors": recent_errors,
    })))
}

async fn cache_clean(
    data_dir: &std::path::Path,
    max_age_secs: Option<u64>,
    max_total_bytes: Option<u64>,
) -> Result<Envelope> {
    let settings = Settings::load(data_dir).context("failed to load configuration")?;
    let store =
        FileStore::open(config::cache_dir(data_dir)).context("failed to open cache directory")?;
    let clock = SystemClock;

    let max_age = Duration::from_secs(max_age_secs.unwrap_or(settings.cache.max_age_secs));
    let budget = max_total_bytes.unwrap_or(settings.cache.max_total_bytes);

    let report = cache::cleanup_store(&store, &clock, max_age, budget)
        .await
        .context("cache cleanup failed")?;
    Ok(Envelope::ok(serde_json::to_value(report)?))
}

fn init(data_dir: &std::path::Path) -> Result<Envelope> {
    let path = Settings::write_template(data_dir)?;
    if let Err(error) = std::fs::create_dir_all(config::state_dir(data_dir)) {
        warn!("failed to create state directory: {error}");
    }
    if let Err(error) = std::fs::create_dir_all(config::cache_dir(data_dir)) {
        warn!("failed to create cache directory: {error}");
    }
    Ok(Envelope::ok_message(format!(
        "configuration template at {}",
        path.display()
    )))
}
