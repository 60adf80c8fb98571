//! Price oracle for exit monitoring and paper fills
//!
//! Prices are quoted in SOL per token (Jupiter Price API with
//! `vsToken` = wrapped SOL). A short-lived cache keeps several trades on the
//! same token from hammering the API within one polling interval.

use crate::config::PriceConfig;
use crate::constants::mints;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Source of current prices
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current price in SOL, or `None` when no data is available
    async fn get_price(&self, asset_id: &str) -> Option<f64>;
}

/// Price entry in cache
#[derive(Debug, Clone)]
pub struct PriceEntry {
    /// Price in SOL
    pub price_sol: f64,
    /// When this price was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Jupiter-backed oracle with a TTL cache
pub struct JupiterPriceOracle {
    api_url: String,
    client: reqwest::Client,
    /// Cache TTL
    ttl: Duration,
    /// Cached prices by token address
    prices: RwLock<HashMap<String, PriceEntry>>,
}

impl JupiterPriceOracle {
    pub fn new(config: &PriceConfig) -> Result<Self, PriceOracleError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| PriceOracleError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_url: config.api_url.clone(),
            client,
            ttl: Duration::seconds(config.cache_ttl_secs as i64),
            prices: RwLock::new(HashMap::new()),
        })
    }

    /// Fresh cached price, if any
    pub fn cached(&self, token_address: &str) -> Option<f64> {
        let prices = self.prices.read();
        let entry = prices.get(token_address)?;

        // Check if expired
        let age = Utc::now().signed_duration_since(entry.fetched_at);
        if age > self.ttl {
            return None;
        }

        Some(entry.price_sol)
    }

    /// Set price for a token, dropping entries that have expired
    pub fn set_price(&self, token_address: &str, price_sol: f64) {
        let now = Utc::now();
        let mut prices = self.prices.write();
        prices.retain(|_, entry| now.signed_duration_since(entry.fetched_at) <= self.ttl);
        prices.insert(
            token_address.to_string(),
            PriceEntry {
                price_sol,
                fetched_at: now,
            },
        );
    }

    /// Fetch a price from Jupiter Price API
    async fn fetch_price(&self, token_address: &str) -> Result<Option<f64>, PriceOracleError> {
        tracing::debug!(token = %token_address, "Fetching price from Jupiter");

        let response = self
            .client
            .get(&self.api_url)
            .query(&[("ids", token_address), ("vsToken", mints::SOL)])
            .send()
            .await
            .map_err(|e| PriceOracleError::HttpError(format!("Jupiter price request failed: {}", e)))?;

        // Check for rate limiting
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceOracleError::RateLimited);
        }

        if !response.status().is_success() {
            return Err(PriceOracleError::HttpError(format!(
                "Jupiter API returned error: {}",
                response.status()
            )));
        }

        let data: JupiterPriceResponse = response
            .json()
            .await
            .map_err(|e| PriceOracleError::ParseError(format!("Failed to parse Jupiter response: {}", e)))?;

        Ok(data.price_of(token_address))
    }
}

#[async_trait]
impl PriceOracle for JupiterPriceOracle {
    async fn get_price(&self, asset_id: &str) -> Option<f64> {
        if let Some(price) = self.cached(asset_id) {
            return Some(price);
        }

        match self.fetch_price(asset_id).await {
            Ok(Some(price)) => {
                self.set_price(asset_id, price);
                Some(price)
            }
            Ok(None) => {
                tracing::debug!(token = %asset_id, "Token not found in Jupiter price response");
                None
            }
            Err(e) => {
                tracing::warn!(token = %asset_id, error = %e, "Price lookup failed");
                None
            }
        }
    }
}

/// Jupiter Price API response structure
#[derive(Debug, serde::Deserialize)]
struct JupiterPriceResponse {
    #[serde(default)]
    data: HashMap<String, Option<JupiterPriceData>>,
}

impl JupiterPriceResponse {
    fn price_of(&self, token_address: &str) -> Option<f64> {
        let price = self.data.get(token_address)?.as_ref()?.price.as_f64()?;
        (price.is_finite() && price > 0.0).then_some(price)
    }
}

/// Price data for a single token
#[derive(Debug, serde::Deserialize)]
struct JupiterPriceData {
    price: PriceValue,
}

/// Jupiter versions disagree on number vs string prices
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Number(f64),
    Text(String),
}

impl PriceValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            PriceValue::Number(n) => Some(*n),
            PriceValue::Text(s) => s.parse().ok(),
        }
    }
}

/// Price oracle errors
#[derive(Debug, thiserror::Error)]
pub enum PriceOracleError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// JSON parsing failed
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Rate limited
    #[error("Rate limited by price API")]
    RateLimited,
}
