//! Canonical product record shared by all providers.
//!
//! Provider responses disagree wildly on field names and which fields exist
//! at all, so each provider client normalizes its raw response into this one
//! record with the optional fields made explicit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported affiliate platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Coupang,
    Aliexpress,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Coupang => "coupang",
            Platform::Aliexpress => "aliexpress",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coupang" => Ok(Platform::Coupang),
            "aliexpress" | "ali" => Ok(Platform::Aliexpress),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown platform {0:?} (expected \"coupang\" or \"aliexpress\")")]
pub struct UnknownPlatform(String);

/// One normalized product, as cached and emitted to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub platform: Platform,
    pub title: Option<String>,
    /// Display price with currency, e.g. `"12900 KRW"` or `"3.99 USD"`.
    pub price: Option<String>,
    pub image_url: Option<String>,
    /// Rating as a percentage where the provider exposes one.
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub affiliate_url: Option<String>,
}

/// Presentation form of a product: missing fields become human-readable
/// placeholders instead of nulls, since downstream templating expects text.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDisplay {
    pub platform: Platform,
    pub title: String,
    pub price: String,
    pub image_url: String,
    pub rating: String,
    pub review_count: String,
    pub affiliate_url: String,
}

impl From<ProductRecord> for ProductDisplay {
    fn from(record: ProductRecord) -> Self {
        Self {
            platform: record.platform,
            title: record
                .title
                .unwrap_or_else(|| "title unavailable".to_string()),
            price: record
                .price
                .unwrap_or_else(|| "price information unavailable".to_string()),
            image_url: record.image_url.unwrap_or_default(),
            rating: record
                .rating
                .map(|r| format!("{r:.1}%"))
                .unwrap_or_else(|| "no rating".to_string()),
            review_count: record
                .review_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "no reviews".to_string()),
            affiliate_url: record.affiliate_url.unwrap_or_default(),
        }
    }
}
