//! HTX spot REST client with rate limiting and v2 request signing.

use std::num::NonZeroU32;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use nonzero_ext::nonzero;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use scoa_core::config::ExchangeConfig;
use scoa_core::error::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

/// HTX production API base URL.
pub const HTX_PROD_URL: &str = "https://api.huobi.pro";

// =============================================================================
// Raw API response types
// =============================================================================

/// Standard HTX response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct HtxResponse<T> {
    pub status: String,
    /// Payload; market detail endpoints use `tick` instead of `data`.
    #[serde(alias = "tick")]
    pub data: Option<T>,
    #[serde(rename = "err-msg")]
    pub err_msg: Option<String>,
}

impl<T> HtxResponse<T> {
    /// Unwraps the envelope, mapping a logical error to [`ExchangeError`].
    fn into_data(self) -> Result<T, ExchangeError> {
        if self.status != "ok" {
            return Err(ExchangeError::api(
                200,
                self.err_msg.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ExchangeError::Parse("response missing data".to_string()))
    }
}

/// One entry from `/market/tickers`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTicker {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// 24h base volume.
    pub amount: f64,
}

/// Merged depth/ticker detail from `/market/detail/merged`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMergedDetail {
    pub close: f64,
}

/// One entry from `/v1/account/accounts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccount {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
}

/// Balance list from `/v1/account/accounts/{id}/balance`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAccountBalance {
    pub list: Vec<RawBalanceEntry>,
}

/// One currency/type entry inside the balance list. HTX reports `trade`
/// and `frozen` amounts as separate entries.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBalanceEntry {
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub balance: String,
}

/// One fill from `/v1/order/matchresults`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchResult {
    pub symbol: String,
    #[serde(rename = "trade-id")]
    pub trade_id: i64,
    pub price: String,
    #[serde(rename = "filled-amount")]
    pub filled_amount: String,
    #[serde(rename = "filled-fees")]
    pub filled_fees: String,
    #[serde(rename = "fee-currency")]
    pub fee_currency: String,
    /// Order type, e.g. "buy-limit" or "sell-market".
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(rename = "created-at")]
    pub created_at: i64,
}

// =============================================================================
// Client
// =============================================================================

/// HTX spot REST client.
pub struct HtxClient {
    http: Client,
    base_url: String,
    host: String,
    api_key: String,
    api_secret: SecretString,
    spot_account_id: OnceCell<i64>,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for HtxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtxClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HtxClient {
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

        if config.sandbox {
            warn!("htx has no sandbox environment, using production endpoints");
        }

        let rpm = NonZeroU32::new(config.rate_limit.max(1)).unwrap_or(nonzero!(1u32));
        let quota = Quota::per_minute(rpm).allow_burst(nonzero!(1u32));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            http,
            base_url: HTX_PROD_URL.to_string(),
            host: host_of(HTX_PROD_URL),
            api_key: config.api_key.clone(),
            api_secret: SecretString::from(config.api_secret.clone()),
            spot_account_id: OnceCell::new(),
            rate_limiter,
        })
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.host = host_of(&self.base_url);
        self
    }

    /// Fetches 24h tickers for all symbols in one call.
    ///
    /// # Errors
    /// Returns an error if the API call fails.
    pub async fn tickers(&self) -> Result<Vec<RawTicker>, ExchangeError> {
        self.public_get::<Vec<RawTicker>>("/market/tickers", &[]).await
    }

    /// Fetches the merged ticker detail for one symbol.
    ///
    /// # Errors
    /// Returns an error if the API call fails.
    pub async fn market_detail(&self, symbol: &str) -> Result<RawMergedDetail, ExchangeError> {
        self.public_get::<RawMergedDetail>(
            "/market/detail/merged",
            &[("symbol", symbol.to_lowercase())],
        )
        .await
    }

    /// Fetches the account's balance list for the spot account (signed).
    ///
    /// # Errors
    /// Returns an error if signing or the API call fails.
    pub async fn spot_balances(&self) -> Result<RawAccountBalance, ExchangeError> {
        let account_id = self.spot_account_id().await?;
        let path = format!("/v1/account/accounts/{account_id}/balance");
        self.signed_get::<RawAccountBalance>(&path, Vec::new()).await
    }

    /// Fetches recent fills for one symbol (signed).
    ///
    /// # Errors
    /// Returns an error if signing or the API call fails.
    pub async fn match_results(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<RawMatchResult>, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_lowercase()),
            ("size".to_string(), limit.min(100).to_string()),
        ];
        self.signed_get::<Vec<RawMatchResult>>("/v1/order/matchresults", params)
            .await
    }

    /// Resolves and caches the spot account id.
    async fn spot_account_id(&self) -> Result<i64, ExchangeError> {
        self.spot_account_id
            .get_or_try_init(|| async {
                let accounts: Vec<RawAccount> =
                    self.signed_get("/v1/account/accounts", Vec::new()).await?;

                accounts
                    .iter()
                    .find(|a| a.kind == "spot" && a.state == "working")
                    .map(|a| a.id)
                    .ok_or_else(|| {
                        ExchangeError::Configuration("no working spot account".to_string())
                    })
            })
            .await
            .copied()
    }

    async fn public_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {url}");

        let response = self.http.get(&url).query(query).send().await?;
        Self::handle_response::<T>(response).await
    }

    /// Waits for the rate limiter and makes a signed GET request.
    async fn signed_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra: Vec<(String, String)>,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let mut params = vec![
            ("AccessKeyId".to_string(), self.api_key.clone()),
            ("SignatureMethod".to_string(), "HmacSHA256".to_string()),
            ("SignatureVersion".to_string(), "2".to_string()),
            ("Timestamp".to_string(), timestamp),
        ];
        params.extend(extra);
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical = {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in &params {
                serializer.append_pair(key, value);
            }
            serializer.finish()
        };

        let payload = format!("GET\n{}\n{}\n{}", self.host, path, canonical);
        let signature = self.sign(&payload)?;
        let encoded_signature: String =
            url::form_urlencoded::byte_serialize(signature.as_bytes()).collect();

        let url = format!(
            "{}{}?{}&Signature={}",
            self.base_url, path, canonical, encoded_signature
        );
        debug!("GET {}{}", self.base_url, path);

        let response = self.http.get(&url).send().await?;
        Self::handle_response::<T>(response).await
    }

    fn sign(&self, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::Authentication(format!("invalid API secret: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ExchangeError::rate_limit(60));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::api(status.as_u16(), text));
        }

        let envelope = response.json::<HtxResponse<T>>().await?;
        envelope.into_data()
    }
}

fn host_of(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_else(|| "api.huobi.pro".to_string())
}
