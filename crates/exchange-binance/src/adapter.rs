//! Binance implementation of the shared exchange capability set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use scoa_core::config::ExchangeConfig;
use scoa_core::error::ExchangeError;
use scoa_core::exchange::Exchange;
use scoa_core::types::{Balance, MarketData, Trade, TradeSide};

use crate::client::{BinanceClient, RawTicker};

/// Symbol used for the connectivity probe.
const PROBE_SYMBOL: &str = "BTCUSDT";

/// Binance spot exchange adapter.
pub struct BinanceExchange {
    config: ExchangeConfig,
    client: BinanceClient,
}

impl BinanceExchange {
    /// Creates an adapter from its immutable configuration.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: ExchangeConfig) -> Result<Self, ExchangeError> {
        let client = BinanceClient::new(&config)?;
        Ok(Self { config, client })
    }

    /// Points the adapter at a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    fn ticker_to_market_data(ticker: &RawTicker, timestamp: DateTime<Utc>) -> MarketData {
        MarketData {
            symbol: ticker.symbol.clone(),
            price: num(&ticker.last_price),
            volume_24h: num(&ticker.volume),
            change_24h: num(&ticker.price_change),
            change_24h_percent: num(&ticker.price_change_percent),
            high_24h: num(&ticker.high_price),
            low_24h: num(&ticker.low_price),
            timestamp,
        }
    }
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn name(&self) -> &str {
        "binance"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.has_credentials()
    }

    async fn initialize(&self) -> Result<(), ExchangeError> {
        if self.test_connection().await? {
            info!("binance exchange initialized");
            Ok(())
        } else {
            Err(ExchangeError::Network(
                "connection test returned unexpected data".to_string(),
            ))
        }
    }

    async fn test_connection(&self) -> Result<bool, ExchangeError> {
        let ticker = self.client.ticker_24h(PROBE_SYMBOL).await?;
        Ok(ticker.symbol == PROBE_SYMBOL)
    }

    async fn account_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let account = self.client.account().await?;
        let now = Utc::now();

        let balances: Vec<Balance> = account
            .balances
            .iter()
            .map(|b| Balance::new(&b.asset, num(&b.free), num(&b.locked), now))
            .filter(|b| b.total > 0.0)
            .collect();

        info!(count = balances.len(), "retrieved non-zero binance balances");
        Ok(balances)
    }

    async fn market_data(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<MarketData>, ExchangeError> {
        let targets = symbols.unwrap_or(&self.config.symbols);
        let now = Utc::now();
        let mut result = Vec::with_capacity(targets.len());

        for symbol in targets {
            match self.client.ticker_24h(symbol).await {
                Ok(ticker) => result.push(Self::ticker_to_market_data(&ticker, now)),
                // Unknown symbols are omitted rather than failing the batch.
                Err(ExchangeError::Api { status_code, .. })
                    if status_code == 400 || status_code == 404 =>
                {
                    debug!(symbol = %symbol, "symbol not found, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        info!(count = result.len(), "retrieved binance market data");
        Ok(result)
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, ExchangeError> {
        let mut all_trades = Vec::new();

        for symbol in &self.config.symbols {
            match self.client.my_trades(symbol, limit).await {
                Ok(trades) => {
                    for t in trades {
                        all_trades.push(Trade {
                            symbol: t.symbol.clone(),
                            side: if t.is_buyer {
                                TradeSide::Buy
                            } else {
                                TradeSide::Sell
                            },
                            amount: num(&t.qty),
                            price: num(&t.price),
                            fee: num(&t.commission),
                            fee_asset: t.commission_asset.clone(),
                            timestamp: DateTime::from_timestamp_millis(t.time)
                                .unwrap_or_else(Utc::now),
                            trade_id: t.id.to_string(),
                        });
                    }
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "failed to fetch trades for symbol");
                }
            }
        }

        all_trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all_trades.truncate(limit);

        info!(count = all_trades.len(), "retrieved recent binance trades");
        Ok(all_trades)
    }

    async fn close(&self) {
        debug!("binance connection closed");
    }
}

fn num(value: &str) -> f64 {
    value.parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> ExchangeConfig {
        ExchangeConfig {
            enabled: true,
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            symbols: vec!["FDUSDUSDT".to_string()],
            rate_limit: 6_000,
            timeout_secs: 5,
            ..ExchangeConfig::default()
        }
    }

    async fn adapter(server: &MockServer) -> BinanceExchange {
        BinanceExchange::new(test_config())
            .unwrap()
            .with_base_url(server.uri())
    }

    fn ticker_body(symbol: &str, last: &str) -> serde_json::Value {
        json!({
            "symbol": symbol,
            "lastPrice": last,
            "volume": "123456.7",
            "priceChange": "-0.0002",
            "priceChangePercent": "-0.02",
            "highPrice": "1.0005",
            "lowPrice": "0.9991",
        })
    }

    #[test]
    fn disabled_without_credentials() {
        let mut config = test_config();
        config.api_secret = String::new();

        let exchange = BinanceExchange::new(config).unwrap();
        assert!(!exchange.is_enabled());
    }

    #[test]
    fn enabled_with_flag_and_credentials() {
        let exchange = BinanceExchange::new(test_config()).unwrap();
        assert!(exchange.is_enabled());
    }

    #[tokio::test]
    async fn test_connection_validates_probe_symbol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/24hr"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ticker_body("BTCUSDT", "60000")))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        assert!(exchange.test_connection().await.unwrap());
    }

    #[tokio::test]
    async fn market_data_maps_ticker_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/24hr"))
            .and(query_param("symbol", "FDUSDUSDT"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(ticker_body("FDUSDUSDT", "0.9996")),
            )
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let data = exchange.market_data(None).await.unwrap();

        assert_eq!(data.len(), 1);
        assert_eq!(data[0].symbol, "FDUSDUSDT");
        assert!((data[0].price - 0.9996).abs() < 1e-9);
        assert!((data[0].change_24h_percent + 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_symbols_are_silently_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ticker/24hr"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid symbol"))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let data = exchange.market_data(None).await.unwrap();

        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn balances_filter_zero_totals() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balances": [
                    {"asset": "USDT", "free": "10.5", "locked": "0.5"},
                    {"asset": "BTC", "free": "0.0", "locked": "0.0"},
                ]
            })))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let balances = exchange.account_balances().await.unwrap();

        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].asset, "USDT");
        assert!((balances[0].total - 11.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn trades_are_sorted_most_recent_first_and_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/myTrades"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "symbol": "FDUSDUSDT", "id": 1, "price": "0.9990", "qty": "100",
                    "commission": "0.1", "commissionAsset": "FDUSD",
                    "time": 1_700_000_000_000i64, "isBuyer": true
                },
                {
                    "symbol": "FDUSDUSDT", "id": 2, "price": "0.9995", "qty": "50",
                    "commission": "0.05", "commissionAsset": "FDUSD",
                    "time": 1_700_000_100_000i64, "isBuyer": false
                },
            ])))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let trades = exchange.recent_trades(1).await.unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade_id, "2");
        assert_eq!(trades[0].side, TradeSide::Sell);
    }

    #[tokio::test]
    async fn auth_failure_surfaces_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/account"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let err = exchange.account_balances().await.unwrap_err();

        assert!(matches!(err, ExchangeError::Api { status_code: 401, .. }));
    }
}
