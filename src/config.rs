//! Configuration management for affiliget.
//!
//! Settings live in a TOML file under the data directory; API credentials can
//! also come from the environment (a `.env` file is loaded at startup), which
//! takes precedence over the settings file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::Platform;

/// Settings file name inside the data directory.
pub const SETTINGS_FILE: &str = "config.toml";

/// Known provider-side hard quota: calls per trailing hour.
pub const PROVIDER_HOURLY_QUOTA: usize = 10;

/// Operating mode. Controls the local call threshold and the backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Local dispatch threshold, kept under the provider's hard quota so an
    /// off-by-one or clock skew never trips the provider limit.
    pub fn call_threshold(self) -> usize {
        match self {
            Mode::Development => 8,
            Mode::Production => 9,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse settings file {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cannot write settings file {path}: {source}")]
    Unwritable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no credentials configured for {platform}; run `affiliget init` and edit config.toml, or set the matching environment variables")]
    MissingCredentials { platform: Platform },
}

/// Coupang Partners open API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoupangCredentials {
    pub access_key: String,
    pub secret_key: String,
    /// Channel sub-id attached to search requests for attribution.
    #[serde(default)]
    pub sub_id: Option<String>,
}

/// AliExpress affiliate platform credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliexpressCredentials {
    pub app_key: String,
    pub app_secret: String,
    /// Tracking id required for promotion link generation.
    #[serde(default)]
    pub tracking_id: Option<String>,
}

/// Cache tier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entries older than this are treated as absent on lookup.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// `cache-clean` removes disk entries older than this.
    #[serde(default = "default_cache_max_age_secs")]
    pub max_age_secs: u64,
    /// `cache-clean` evicts oldest entries until total size fits this budget.
    #[serde(default = "default_cache_max_total_bytes")]
    pub max_total_bytes: u64,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_cache_max_age_secs() -> u64 {
    7200
}
fn default_cache_max_total_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_age_secs: default_cache_max_age_secs(),
            max_total_bytes: default_cache_max_total_bytes(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Quota window tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSettings {
    /// Trailing window over which outbound calls are counted.
    #[serde(default = "default_quota_window_secs")]
    pub window_secs: u64,
}

fn default_quota_window_secs() -> u64 {
    3600
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            window_secs: default_quota_window_secs(),
        }
    }
}

impl QuotaSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_error_log_cap")]
    pub error_log_cap: usize,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub quota: QuotaSettings,
    #[serde(default)]
    pub coupang: Option<CoupangCredentials>,
    #[serde(default)]
    pub aliexpress: Option<AliexpressCredentials>,
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_error_log_cap() -> usize {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            http_timeout_secs: default_http_timeout_secs(),
            error_log_cap: default_error_log_cap(),
            cache: CacheSettings::default(),
            quota: QuotaSettings::default(),
            coupang: None,
            aliexpress: None,
        }
    }
}

impl Settings {
    /// Load settings from `{data_dir}/config.toml`, falling back to defaults
    /// when the file does not exist, then apply environment overrides.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
                path: path.clone(),
                source,
            })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Invalid { path, source })?
        } else {
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Environment variables take precedence over the settings file, so
    /// secrets never need to be written to disk.
    fn apply_env_overrides(&mut self) {
        if let Some(mode) = env_nonempty("AFFILIGET_MODE") {
            match mode.parse::<ModeWrapper>() {
                Ok(ModeWrapper(m)) => self.mode = m,
                Err(()) => tracing::warn!("ignoring unknown AFFILIGET_MODE={mode:?}"),
            }
        }

        if let (Some(access_key), Some(secret_key)) = (
            env_nonempty("COUPANG_ACCESS_KEY"),
            env_nonempty("COUPANG_SECRET_KEY"),
        ) {
            self.coupang = Some(CoupangCredentials {
                access_key,
                secret_key,
                sub_id: env_nonempty("COUPANG_SUB_ID")
                    .or_else(|| self.coupang.as_ref().and_then(|c| c.sub_id.clone())),
            });
        }

        if let (Some(app_key), Some(app_secret)) = (
            env_nonempty("ALIEXPRESS_APP_KEY"),
            env_nonempty("ALIEXPRESS_APP_SECRET"),
        ) {
            self.aliexpress = Some(AliexpressCredentials {
                app_key,
                app_secret,
                tracking_id: env_nonempty("ALIEXPRESS_TRACKING_ID")
                    .or_else(|| self.aliexpress.as_ref().and_then(|c| c.tracking_id.clone())),
            });
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Credentials for a platform, or a fatal configuration error.
    pub fn coupang(&self) -> Result<&CoupangCredentials, ConfigError> {
        self.coupang
            .as_ref()
            .ok_or(ConfigError::MissingCredentials {
                platform: Platform::Coupang,
            })
    }

    pub fn aliexpress(&self) -> Result<&AliexpressCredentials, ConfigError> {
        self.aliexpress
            .as_ref()
            .ok_or(ConfigError::MissingCredentials {
                platform: Platform::Aliexpress,
            })
    }

    /// Write a commented template config for `affiliget init`. Does not
    /// overwrite an existing file.
    pub fn write_template(data_dir: &Path) -> Result<PathBuf, ConfigError> {
        let path = data_dir.join(SETTINGS_FILE);
        if path.exists() {
            return Ok(path);
        }
        std::fs::create_dir_all(data_dir).map_err(|source| ConfigError::Unwritable {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, SETTINGS_TEMPLATE).map_err(|source| ConfigError::Unwritable {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

// Mode::from_str without exposing a public FromStr for a config-internal need.
struct ModeWrapper(Mode);

impl std::str::FromStr for ModeWrapper {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(ModeWrapper(Mode::Development)),
            "production" | "prod" => Ok(ModeWrapper(Mode::Production)),
            _ => Err(()),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Default data directory: `$XDG_DATA_HOME/affiliget` (or the platform
/// equivalent), with a local fallback for stripped-down environments.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("affiliget"))
        .unwrap_or_else(|| PathBuf::from("./affiliget-data"))
}

/// Directory for quota history, error log, and other tool state.
pub fn state_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("state")
}

/// Directory for the on-disk cache tier.
pub fn cache_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("cache")
}

const SETTINGS_TEMPLATE: &str = r#"# affiliget configuration
#
# mode: "development" keeps a larger safety margin under the provider call
# quota (8/hour vs 9/hour against a hard limit of 10/hour).
mode = "development"

# Per-request HTTP timeout in seconds.
http_timeout_secs = 15

[cache]
# Seconds before a cached response is considered stale.
ttl_secs = 3600
# `affiliget cache-clean` bounds: maximum entry age and total on-disk size.
max_age_secs = 7200
max_total_bytes = 52428800

[quota]
# Trailing window (seconds) over which outbound calls are counted.
window_secs = 3600

# Credentials may live here or in the environment (.env is loaded):
#   COUPANG_ACCESS_KEY / COUPANG_SECRET_KEY / COUPANG_SUB_ID
#   ALIEXPRESS_APP_KEY / ALIEXPRESS_APP_SECRET / ALIEXPRESS_TRACKING_ID
#
# [coupang]
# access_key = ""
# secret_key = ""
# sub_id = ""
#
# [aliexpress]
# app_key = ""
# app_secret = ""
# tracking_id = ""
"#;
