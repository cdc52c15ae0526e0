//! Binance spot REST client with rate limiting and request signing.

use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use nonzero_ext::nonzero;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use scoa_core::config::ExchangeConfig;
use scoa_core::error::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

/// Binance production API base URL.
pub const BINANCE_PROD_URL: &str = "https://api.binance.com";

/// Binance spot testnet base URL.
pub const BINANCE_TESTNET_URL: &str = "https://testnet.binance.vision";

/// Window in which a signed request stays valid, in milliseconds.
const RECV_WINDOW_MS: u64 = 5_000;

// =============================================================================
// Raw API response types
// =============================================================================

/// 24h ticker statistics as returned by `/api/v3/ticker/24hr`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    pub symbol: String,
    pub last_price: String,
    pub volume: String,
    pub price_change: String,
    pub price_change_percent: String,
    pub high_price: String,
    pub low_price: String,
}

/// Account snapshot as returned by `/api/v3/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccount {
    pub balances: Vec<RawBalance>,
}

/// One asset entry inside the account snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

/// One fill as returned by `/api/v3/myTrades`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    pub symbol: String,
    pub id: i64,
    pub price: String,
    pub qty: String,
    pub commission: String,
    pub commission_asset: String,
    pub time: i64,
    pub is_buyer: bool,
}

// =============================================================================
// Client
// =============================================================================

/// Binance spot REST client.
///
/// Every request waits on the per-adapter rate limiter first, so calls on
/// one adapter are spaced at least `60 / rate_limit` seconds apart without
/// blocking other adapters' tasks.
pub struct BinanceClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BinanceClient {
    /// Creates a client from exchange configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        let base_url = if config.sandbox {
            BINANCE_TESTNET_URL.to_string()
        } else {
            BINANCE_PROD_URL.to_string()
        };

        let rpm = NonZeroU32::new(config.rate_limit.max(1)).unwrap_or(nonzero!(1u32));
        let quota = Quota::per_minute(rpm).allow_burst(nonzero!(1u32));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            api_secret: SecretString::from(config.api_secret.clone()),
            rate_limiter,
        })
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Fetches 24h ticker statistics for one symbol.
    ///
    /// # Errors
    /// Returns an error if the API call fails.
    pub async fn ticker_24h(&self, symbol: &str) -> Result<RawTicker, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        debug!(symbol, "GET {url}");

        let response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Fetches the account snapshot (signed).
    ///
    /// # Errors
    /// Returns an error if signing or the API call fails.
    pub async fn account(&self) -> Result<RawAccount, ExchangeError> {
        self.signed_get("/api/v3/account", Vec::new()).await
    }

    /// Fetches recent fills for one symbol (signed).
    ///
    /// # Errors
    /// Returns an error if signing or the API call fails.
    pub async fn my_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<RawTrade>, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        self.signed_get("/api/v3/myTrades", params).await
    }

    /// Waits for the rate limiter and makes a signed GET request.
    ///
    /// The signature is HMAC-SHA256 over the full query string, appended
    /// as the final `signature` parameter.
    async fn signed_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        params.push((
            "timestamp".to_string(),
            Utc::now().timestamp_millis().to_string(),
        ));
        params.push(("recvWindow".to_string(), RECV_WINDOW_MS.to_string()));

        let query: String = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&query)?;

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        debug!("GET {}{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    fn sign(&self, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::Authentication(format!("invalid API secret: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(ExchangeError::rate_limit(retry_after));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::api(status.as_u16(), text));
        }

        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_secret(secret: &str) -> ExchangeConfig {
        ExchangeConfig {
            enabled: true,
            api_key: "key".to_string(),
            api_secret: secret.to_string(),
            rate_limit: 6_000,
            ..ExchangeConfig::default()
        }
    }

    #[test]
    fn signature_is_deterministic() {
        let client = BinanceClient::new(&config_with_secret("test-secret")).unwrap();

        let sig1 = client.sign("symbol=BTCUSDT&timestamp=1700000000000").unwrap();
        let sig2 = client.sign("symbol=BTCUSDT&timestamp=1700000000000").unwrap();

        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64); // hex-encoded SHA-256
    }

    #[test]
    fn different_payloads_produce_different_signatures() {
        let client = BinanceClient::new(&config_with_secret("test-secret")).unwrap();

        let sig1 = client.sign("timestamp=1").unwrap();
        let sig2 = client.sign("timestamp=2").unwrap();

        assert_ne!(sig1, sig2);
    }

    #[test]
    fn sandbox_flag_selects_testnet_url() {
        let config = ExchangeConfig {
            sandbox: true,
            ..config_with_secret("s")
        };
        let client = BinanceClient::new(&config).unwrap();

        assert_eq!(client.base_url, BINANCE_TESTNET_URL);
    }

    #[test]
    fn debug_output_omits_credentials() {
        let client = BinanceClient::new(&config_with_secret("super-secret")).unwrap();
        let debug = format!("{client:?}");

        assert!(!debug.contains("super-secret"));
    }
}
