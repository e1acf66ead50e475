//! AliExpress affiliate open platform client (MD5-signed gateway calls).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::transport::{ApiRequest, ApiResponse, Transport};
use super::{ProviderClient, ProviderError};
use crate::clock::Clock;
use crate::config::AliexpressCredentials;
use crate::models::{Platform, ProductRecord};
use crate::sign;

const DEFAULT_GATEWAY: &str = "https://api-sg.aliexpress.com/sync";
const SEARCH_METHOD: &str = "aliexpress.affiliate.product.query";
const LINK_METHOD: &str = "aliexpress.affiliate.link.generate";

/// Timestamp format the gateway expects in the `timestamp` parameter.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---- Raw response shapes (provider field names) ----

#[derive(Debug, Clone, Deserialize)]
struct RawProduct {
    product_title: Option<String>,
    target_sale_price: Option<String>,
    target_sale_price_currency: Option<String>,
    product_main_image_url: Option<String>,
    /// Percentage string like `"95.5%"`.
    evaluate_rate: Option<String>,
    /// Recent sales volume; the closest thing to a review count the API has.
    lastest_volume: Option<u64>,
    promotion_link: Option<String>,
    product_detail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductList {
    #[serde(default)]
    product: Vec<RawProduct>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    products: Option<ProductList>,
}

#[derive(Debug, Deserialize)]
struct RespResult<T> {
    resp_code: Option<i64>,
    resp_msg: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    resp_result: Option<RespResult<QueryResult>>,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    code: Option<serde_json::Value>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "aliexpress_affiliate_product_query_response")]
    response: Option<QueryResponse>,
    error_response: Option<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    promotion_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkList {
    #[serde(default)]
    promotion_link: Vec<RawLink>,
}

#[derive(Debug, Deserialize)]
struct LinkResult {
    promotion_links: Option<LinkList>,
}

#[derive(Debug, Deserialize)]
struct LinkResponse {
    resp_result: Option<RespResult<LinkResult>>,
}

#[derive(Debug, Deserialize)]
struct LinkEnvelope {
    #[serde(rename = "aliexpress_affiliate_link_generate_response")]
    response: Option<LinkResponse>,
    error_response: Option<GatewayError>,
}

/// AliExpress affiliate client. All calls are POSTs to one gateway endpoint
/// with a signed, form-encoded parameter set.
pub struct AliexpressClient {
    credentials: AliexpressCredentials,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    gateway: String,
}

impl AliexpressClient {
    pub fn new(
        credentials: AliexpressCredentials,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            transport,
            clock,
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }

    /// Override the gateway endpoint (tests).
    #[allow(dead_code)]
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// System parameters common to every gateway call, plus the signature
    /// over the complete sorted parameter set.
    fn signed_params(
        &self,
        method: &str,
        business: Vec<(String, String)>,
    ) -> Vec<(String, String)> {
        let mut params = business;
        params.push(("method".to_string(), method.to_string()));
        params.push(("app_key".to_string(), self.credentials.app_key.clone()));
        params.push(("sign_method".to_string(), "md5".to_string()));
        params.push(("format".to_string(), "json".to_string()));
        params.push(("v".to_string(), "2.0".to_string()));
        params.push((
            "timestamp".to_string(),
            self.clock.now().format(TIMESTAMP_FORMAT).to_string(),
        ));

        let signature = sign::md5_signature(&self.credentials.app_secret, &params);
        params.push(("sign".to_string(), signature));
        params
    }

    async fn call(
        &self,
        method: &str,
        business: Vec<(String, String)>,
    ) -> Result<ApiResponse, ProviderError> {
        let params = self.signed_params(method, business);
        let request = ApiRequest::post(&self.gateway).form(params);

        let response = self.transport.execute(request).await?;
        debug!("aliexpress {}: HTTP {}", method, response.status);

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

    fn gateway_error(error: GatewayError) -> ProviderError {
        ProviderError::Api {
            code: error
                .code
                .map(|c| c.to_string().trim_matches('"').to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            message: error.msg.unwrap_or_else(|| "gateway error".to_string()),
        }
    }

    fn normalize(raw: RawProduct) -> ProductRecord {
        let price = match (raw.target_sale_price, raw.target_sale_price_currency) {
            (Some(price), Some(currency)) => Some(format!("{price} {currency}")),
            (Some(price), None) => Some(price),
            (None, _) => None,
        };

        ProductRecord {
            platform: Platform::Aliexpress,
            title: raw.product_title,
            price,
            image_url: raw.product_main_image_url,
            rating: raw
                .evaluate_rate
                .and_then(|r| r.trim_end_matches('%').parse::<f64>().ok()),
            review_count: raw.lastest_volume,
            affiliate_url: raw.promotion_link.or(raw.product_detail_url),
        }
    }
}

#[async_trait]
impl ProviderClient for AliexpressClient {
    fn platform(&self) -> Platform {
        Platform::Aliexpress
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<ProductRecord>, ProviderError> {
        let mut business = vec![
            ("keywords".to_string(), keyword.to_string()),
            ("page_size".to_string(), limit.to_string()),
            ("target_currency".to_string(), "USD".to_string()),
            ("target_language".to_string(), "EN".to_string()),
        ];
        if let Some(tracking_id) = &self.credentials.tracking_id {
            business.push(("tracking_id".to_string(), tracking_id.clone()));
        }

        let response = self.call(SEARCH_METHOD, business).await?;
        let envelope: QueryEnvelope = serde_json::from_str(&response.body)?;

        if let Some(error) = envelope.error_response {
            return Err(Self::gateway_error(error));
        }

        let resp_result = envelope
            .response
            .and_then(|r| r.resp_result)
            .ok_or_else(|| ProviderError::Api {
                code: "unknown".to_string(),
                message: "missing resp_result".to_string(),
            })?;
        if let (Some(code), true) = (resp_result.resp_code, resp_result.result.is_none()) {
            return Err(ProviderError::Api {
                code: code.to_string(),
                message: resp_result
                    .resp_msg
                    .unwrap_or_else(|| "gateway error".to_string()),
            });
        }

        Ok(resp_result
            .result
            .and_then(|r| r.products)
            .map(|p| p.product)
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .map(Self::normalize)
            .collect())
    }

    async fn deeplink(&self, url: &str) -> Result<String, ProviderError> {
        let mut business = vec![
            ("source_values".to_string(), url.to_string()),
            ("promotion_link_type".to_string(), "0".to_string()),
        ];
        if let Some(tracking_id) = &self.credentials.tracking_id {
            business.push(("tracking_id".to_string(), tracking_id.clone()));
        }

        let response = self.call(LINK_METHOD, business).await?;
        let envelope: LinkEnvelope = serde_json::from_str(&response.body)?;

        if let Some(error) = envelope.error_response {
            return Err(Self::gateway_error(error));
        }

        envelope
            .response
            .and_then(|r| r.resp_result)
            .and_then(|r| r.result)
            .and_then(|r| r.promotion_links)
            .and_then(|l| l.promotion_link.into_iter().next())
            .and_then(|l| l.promotion_link)
            .ok_or_else(|| ProviderError::Api {
                code: "unknown".to_string(),
                message: "promotion link not returned".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response_normalizes() {
        let body = r#"{
            "aliexpress_affiliate_product_query_response": {
                "resp_result": {
                    "resp_code": 200,
                    "resp_msg": "success",
                    "result": {
                        "products": {
                            "product": [
                                {
                                    "product_title": "Wireless Keyboard",
                                    "target_sale_price": "12.99",
                                    "target_sale_price_currency": "USD",
                                    "product_main_image_url": "https://ae01.alicdn.com/1.jpg",
                                    "evaluate_rate": "96.3%",
                                    "lastest_volume": 412,
                                    "promotion_link": "https://s.click.aliexpress.com/e/x"
                                }
                            ]
                        }
                    }
                }
            }
        }"#;

        let envelope: QueryEnvelope = serde_json::from_str(body).unwrap();
        let products = envelope
            .response
            .unwrap()
            .resp_result
            .unwrap()
            .result
            .unwrap()
            .products
            .unwrap()
            .product;

        let record = AliexpressClient::normalize(products[0].clone());
        assert_eq!(record.title.as_deref(), Some("Wireless Keyboard"));
        assert_eq!(record.price.as_deref(), Some("12.99 USD"));
        assert_eq!(record.rating, Some(96.3));
        assert_eq!(record.review_count, Some(412));
        assert_eq!(record.platform, Platform::Aliexpress);
    }

    #[test]
    fn test_error_response_parses() {
        let body = r#"{"error_response": {"code": 7, "msg": "App call limited"}}"#;
        let envelope: QueryEnvelope = serde_json::from_str(body).unwrap();
        let error = envelope.error_response.unwrap();
        match AliexpressClient::gateway_error(error) {
            ProviderError::Api { code, message } => {
                assert_eq!(code, "7");
                assert_eq!(message, "App call limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_normalize_without_promotion_link_falls_back() {
        let raw = RawProduct {
            product_title: None,
            target_sale_price: Some("3.50".to_string()),
            target_sale_price_currency: None,
            product_main_image_url: None,
            evaluate_rate: Some("not-a-number".to_string()),
            lastest_volume: None,
            promotion_link: None,
            product_detail_url: Some("https://aliexpress.com/item/1.html".to_string()),
        };

        let record = AliexpressClient::normalize(raw);
        assert_eq!(record.price.as_deref(), Some("3.50"));
        assert_eq!(record.rating, None);
        assert_eq!(
            record.affiliate_url.as_deref(),
            Some("https://aliexpress.com/item/1.html")
        );
    }
}
