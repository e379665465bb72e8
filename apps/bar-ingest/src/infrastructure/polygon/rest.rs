//! Polygon Reference Data Client
//!
//! REST implementation of [`SymbolDetailsLookup`] backed by
//! `GET /v3/reference/tickers/{ticker}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::application::ports::{LookupError, SymbolDetailsLookup};
use crate::domain::market_data::SymbolDetails;

/// REST client configuration.
#[derive(Clone)]
pub struct RestClientConfig {
    /// API base URL without trailing slash.
    pub base_url: String,
    /// API key sent as the `apiKey` query parameter.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestClientConfig {
    /// Production API host.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.polygon.io";
}

impl std::fmt::Debug for RestClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    ticker: String,
    name: Option<String>,
    market: Option<String>,
    locale: Option<String>,
    #[serde(rename = "type")]
    type_code: Option<String>,
    active: Option<bool>,
    currency_name: Option<String>,
}

impl From<TickerDetails> for SymbolDetails {
    fn from(details: TickerDetails) -> Self {
        Self {
            symbol: details.ticker,
            name: details.name,
            market: details.market,
            locale: details.locale,
            type_code: details.type_code,
            active: details.active,
            currency: details.currency_name,
        }
    }
}

/// Ticker details client.
pub struct PolygonRestClient {
    http_client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl std::fmt::Debug for PolygonRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonRestClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PolygonRestClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute http(s) URL or
    /// the HTTP client cannot be built.
    pub fn new(config: &RestClientConfig) -> Result<Self, LookupError> {
        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| LookupError::Network {
                message: format!("invalid base url: {}", config.base_url),
            })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LookupError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }
}

impl PolygonRestClient {
    /// Ticker details URL; the symbol is percent-encoded as one path segment.
    fn ticker_url(&self, symbol: &str) -> Result<Url, LookupError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| LookupError::Network {
                message: format!("invalid base url: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(["v3", "reference", "tickers", symbol]);
        Ok(url)
    }
}

#[async_trait]
impl SymbolDetailsLookup for PolygonRestClient {
    async fn fetch_symbol_details(&self, symbol: &str) -> Result<SymbolDetails, LookupError> {
        let url = self.ticker_url(symbol)?;

        let response = self
            .http_client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LookupError::Timeout
                } else {
                    LookupError::Network {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: TickerDetailsResponse =
            response.json().await.map_err(|e| LookupError::Decode {
                message: e.to_string(),
            })?;

        body.results
            .map(SymbolDetails::from)
            .ok_or_else(|| LookupError::NotFound {
                symbol: symbol.to_string(),
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
