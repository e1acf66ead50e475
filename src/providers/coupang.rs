//! Coupang Partners open API client (HMAC-signed).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::transport::{ApiRequest, ApiResponse, Transport};
use super::{ProviderClient, ProviderError};
use crate::clock::Clock;
use crate::config::CoupangCredentials;
use crate::models::{Platform, ProductRecord};
use crate::sign;

const DEFAULT_DOMAIN: &str = "https://api-gateway.coupang.com";
const SEARCH_PATH: &str = "/v2/providers/affiliate_open_api/apis/openapi/products/search";
const DEEPLINK_PATH: &str = "/v2/providers/affiliate_open_api/apis/openapi/v1/deeplink";

/// Response envelope code meaning success.
const RCODE_OK: &str = "0";

// ---- Raw response shapes (provider field names) ----

#[derive(Debug, Clone, Deserialize)]
struct RawProduct {
    #[serde(rename = "productName")]
    product_name: Option<String>,
    #[serde(rename = "productPrice")]
    product_price: Option<u64>,
    #[serde(rename = "productImage")]
    product_image: Option<String>,
    #[serde(rename = "productUrl")]
    product_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSearchData {
    #[serde(rename = "productData", default)]
    product_data: Vec<RawProduct>,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(rename = "rCode")]
    r_code: String,
    #[serde(rename = "rMessage", default)]
    r_message: String,
    data: Option<RawSearchData>,
}

#[derive(Debug, Deserialize)]
struct RawDeeplink {
    #[serde(rename = "shortenUrl")]
    shorten_url: Option<String>,
    #[serde(rename = "landingUrl")]
    landing_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDeeplinkResponse {
    #[serde(rename = "rCode")]
    r_code: String,
    #[serde(rename = "rMessage", default)]
    r_message: String,
    data: Option<Vec<RawDeeplink>>,
}

/// Coupang Partners client. Signing is delegated to [`crate::sign`] with the
/// timestamp drawn from the injected clock, so requests are reproducible.
pub struct CoupangClient {
    credentials: CoupangCredentials,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    domain: String,
}

impl CoupangClient {
    pub fn new(
        credentials: CoupangCredentials,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            transport,
            clock,
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }

    /// Override the API domain (tests).
    #[allow(dead_code)]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Deterministic query string: keys sorted, values percent-encoded. The
    /// same string is both signed and sent, which the gateway requires.
    fn canonical_query(params: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn call(
        &self,
        method: &str,
        path: &str,
        query: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, ProviderError> {
        let (signed_uri, url) = if query.is_empty() {
            (path.to_string(), format!("{}{}", self.domain, path))
        } else {
            let qs = Self::canonical_query(query);
            (
                format!("{path}?{qs}"),
                format!("{}{}?{}", self.domain, path, qs),
            )
        };

        let authorization = sign::hmac_authorization(
            &self.credentials.access_key,
            &self.credentials.secret_key,
            method,
            &signed_uri,
            self.clock.now(),
        )?;

        let mut request = match method {
            "POST" => ApiRequest::post(url),
            _ => ApiRequest::get(url),
        }
        .header("Authorization", authorization)
        .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.transport.execute(request).await?;
        debug!("coupang {} {}: HTTP {}", method, path, response.status);

        if response.is_rate_limited() {
            return Err(ProviderError::RateLimited);
        }
        if !response.is_success() {
            return Err(ProviderError::Api {
                code: format!("http-{}", response.status),
                message: super::truncate_body(&response.body, 300),
            });
        }
        Ok(response)
    }

    fn normalize(raw: RawProduct) -> ProductRecord {
        ProductRecord {
            platform: Platform::Coupang,
            title: raw.product_name,
            price: raw.product_price.map(|p| format!("{p} KRW")),
            image_url: raw.product_image,
            // The search endpoint exposes neither ratings nor review counts
            rating: None,
            review_count: None,
            affiliate_url: raw.product_url,
        }
    }
}

#[async_trait]
impl ProviderClient for CoupangClient {
    fn platform(&self) -> Platform {
        Platform::Coupang
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<ProductRecord>, ProviderError> {
        let mut query = vec![
            ("keyword".to_string(), keyword.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(sub_id) = &self.credentials.sub_id {
            query.push(("subId".to_string(), sub_id.clone()));
        }

        let response = self.call("GET", SEARCH_PATH, &query, None).await?;
        let parsed: RawSearchResponse = serde_json::from_str(&response.body)?;

        if parsed.r_code != RCODE_OK {
            return Err(ProviderError::Api {
                code: parsed.r_code,
                message: parsed.r_message,
            });
        }

        Ok(parsed
            .data
            .map(|d| d.product_data)
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .map(Self::normalize)
            .collect())
    }

    async fn deeplink(&self, url: &str) -> Result<String, ProviderError> {
        let body = json!({ "coupangUrls": [url] });
        let response = self.call("POST", DEEPLINK_PATH, &[], Some(body)).await?;
        let parsed: RawDeeplinkResponse = serde_json::from_str(&response.body)?;

        if parsed.r_code != RCODE_OK {
            return Err(ProviderError::Api {
                code: parsed.r_code,
                message: parsed.r_message,
            });
        }

        parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|link| link.shorten_url.or(link.landing_url))
            .ok_or_else(|| ProviderError::Api {
                code: RCODE_OK.to_string(),
                message: "deeplink not returned".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_query_sorts_and_encodes() {
        let query = vec![
            ("limit".to_string(), "10".to_string()),
            ("keyword".to_string(), "무선 키보드".to_string()),
        ];
        let qs = CoupangClient::canonical_query(&query);
        assert!(qs.starts_with("keyword="));
        assert!(qs.ends_with("&limit=10"));
        assert!(!qs.contains(' '));
    }

    #[test]
    fn test_search_response_normalizes() {
        let body = r#"{
            "rCode": "0",
            "rMessage": "",
            "data": {
                "landingUrl": "https://link.coupang.com/x",
                "productData": [
                    {
                        "productId": 123,
                        "productName": "무선 키보드",
                        "productPrice": 29900,
                        "productImage": "https://img.coupang.com/1.jpg",
                        "productUrl": "https://link.coupang.com/p/123"
                    },
                    { "productId": 456 }
                ]
            }
        }"#;

        let parsed: RawSearchResponse = serde_json::from_str(body).unwrap();
        let records: Vec<ProductRecord> = parsed
            .data
            .unwrap()
            .product_data
            .into_iter()
            .map(CoupangClient::normalize)
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title.as_deref(), Some("무선 키보드"));
        assert_eq!(records[0].price.as_deref(), Some("29900 KRW"));
        assert_eq!(records[0].platform, Platform::Coupang);
        // Sparse item keeps explicit absences for the display layer
        assert!(records[1].title.is_none());
        assert!(records[1].price.is_none());
    }

    #[test]
    fn test_error_code_surfaces() {
        let body = r#"{"rCode": "401", "rMessage": "Unauthorized"}"#;
        let parsed: RawSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.r_code, "401");
        assert_eq!(parsed.r_message, "Unauthorized");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "한국어 텍스트";
        let t = crate::providers::truncate_body(s, 4);
        assert!(t.chars().count() <= 3);
    }
}
