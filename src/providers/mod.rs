//! Provider API clients and response normalization.
//!
//! Each client signs its own requests, dispatches through the [`Transport`]
//! seam, and normalizes the provider's raw response shape into
//! [`ProductRecord`]s.

mod aliexpress;
mod coupang;
mod transport;

pub use aliexpress::AliexpressClient;
pub use coupang::CoupangClient;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};

use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::config::{ConfigError, Settings};
use crate::models::{Platform, ProductRecord};

/// Errors from a provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider rate limited the request (HTTP 429)")]
    RateLimited,
    #[error("provider rejected the request ({code}): {message}")]
    Api { code: String, message: String },
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Sign(#[from] crate::sign::SignError),
}

/// One affiliate API provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Keyword product search, at most `limit` results.
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<ProductRecord>, ProviderError>;

    /// Convert a product URL into a tracked affiliate deep link.
    async fn deeplink(&self, url: &str) -> Result<String, ProviderError>;
}

/// Trim a response body for inclusion in an error message, on a char
/// boundary.
pub(crate) fn truncate_body(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Build the client for a platform, failing fast when its credentials are
/// not configured.
pub fn client_for(
    platform: Platform,
    settings: &Settings,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn ProviderClient>, ConfigError> {
    match platform {
        Platform::Coupang => Ok(Box::new(CoupangClient::new(
            settings.coupang()?.clone(),
            transport,
            clock,
        ))),
        Platform::Aliexpress => Ok(Box::new(AliexpressClient::new(
            settings.aliexpress()?.clone(),
            transport,
            clock,
        ))),
    }
}
