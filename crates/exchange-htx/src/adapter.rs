//! HTX implementation of the shared exchange capability set.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use scoa_core::config::ExchangeConfig;
use scoa_core::error::ExchangeError;
use scoa_core::exchange::Exchange;
use scoa_core::types::{Balance, MarketData, Trade, TradeSide};

use crate::client::HtxClient;

/// Symbol used for the connectivity probe.
const PROBE_SYMBOL: &str = "btcusdt";

/// HTX spot exchange adapter.
pub struct HtxExchange {
    config: ExchangeConfig,
    client: HtxClient,
}

impl HtxExchange {
    /// Creates an adapter from its immutable configuration.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: ExchangeConfig) -> Result<Self, ExchangeError> {
        let client = HtxClient::new(&config)?;
        Ok(Self { config, client })
    }

    /// Points the adapter at a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait]
impl Exchange for HtxExchange {
    fn name(&self) -> &str {
        "htx"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.has_credentials()
    }

    async fn initialize(&self) -> Result<(), ExchangeError> {
        if self.test_connection().await? {
            info!("htx exchange initialized");
            Ok(())
        } else {
            Err(ExchangeError::Network(
                "connection test returned unexpected data".to_string(),
            ))
        }
    }

    async fn test_connection(&self) -> Result<bool, ExchangeError> {
        let detail = self.client.market_detail(PROBE_SYMBOL).await?;
        Ok(detail.close > 0.0)
    }

    async fn account_balances(&self) -> Result<Vec<Balance>, ExchangeError> {
        let account = self.client.spot_balances().await?;
        let now = Utc::now();

        // HTX reports free and locked amounts as separate list entries.
        let mut amounts: HashMap<String, (f64, f64)> = HashMap::new();
        for entry in &account.list {
            let amount: f64 = entry.balance.parse().unwrap_or_default();
            let slot = amounts.entry(entry.currency.to_uppercase()).or_default();
            match entry.kind.as_str() {
                "trade" => slot.0 += amount,
                "frozen" => slot.1 += amount,
                other => debug!(kind = other, "ignoring balance entry type"),
            }
        }

        let balances: Vec<Balance> = amounts
            .into_iter()
            .map(|(asset, (free, locked))| Balance::new(asset, free, locked, now))
            .filter(|b| b.total > 0.0)
            .collect();

        info!(count = balances.len(), "retrieved non-zero htx balances");
        Ok(balances)
    }

    async fn market_data(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<MarketData>, ExchangeError> {
        let targets = symbols.unwrap_or(&self.config.symbols);
        let wanted: Vec<String> = targets.iter().map(|s| s.to_lowercase()).collect();
        let now = Utc::now();

        // One tickers call covers every listed symbol; requested symbols
        // the exchange does not know simply produce no entry.
        let tickers = self.client.tickers().await?;

        let result: Vec<MarketData> = tickers
            .iter()
            .filter(|t| wanted.contains(&t.symbol.to_lowercase()))
            .map(|t| {
                let change = t.close - t.open;
                let change_percent = if t.open > 0.0 {
                    change / t.open * 100.0
                } else {
                    0.0
                };
                MarketData {
                    symbol: t.symbol.to_uppercase(),
                    price: t.close,
                    volume_24h: t.amount,
                    change_24h: change,
                    change_24h_percent: change_percent,
                    high_24h: t.high,
                    low_24h: t.low,
                    timestamp: now,
                }
            })
            .collect();

        info!(count = result.len(), "retrieved htx market data");
        Ok(result)
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, ExchangeError> {
        let mut all_trades = Vec::new();

        for symbol in &self.config.symbols {
            match self.client.match_results(symbol, limit).await {
                Ok(results) => {
                    for r in results {
                        all_trades.push(Trade {
                            symbol: r.symbol.to_uppercase(),
                            side: if r.order_type.starts_with("buy") {
                                TradeSide::Buy
                            } else {
                                TradeSide::Sell
                            },
                            amount: r.filled_amount.parse().unwrap_or_default(),
                            price: r.price.parse().unwrap_or_default(),
                            fee: r.filled_fees.parse().unwrap_or_default(),
                            fee_asset: r.fee_currency.to_uppercase(),
                            timestamp: DateTime::from_timestamp_millis(r.created_at)
                                .unwrap_or_else(Utc::now),
                            trade_id: r.trade_id.to_string(),
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

        info!(count = all_trades.len(), "retrieved recent htx trades");
        Ok(all_trades)
    }

    async fn close(&self) {
        debug!("htx connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> ExchangeConfig {
        ExchangeConfig {
            enabled: true,
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            symbols: vec!["USDCUSDT".to_string()],
            rate_limit: 6_000,
            timeout_secs: 5,
            ..ExchangeConfig::default()
        }
    }

    async fn adapter(server: &MockServer) -> HtxExchange {
        HtxExchange::new(test_config())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn market_data_filters_to_configured_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market/tickers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": [
                    {"symbol": "usdcusdt", "open": 1.0000, "high": 1.0004,
                     "low": 0.9995, "close": 0.9998, "amount": 12345.0},
                    {"symbol": "btcusdt", "open": 59000.0, "high": 61000.0,
                     "low": 58000.0, "close": 60000.0, "amount": 99.0},
                ]
            })))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let data = exchange.market_data(None).await.unwrap();

        assert_eq!(data.len(), 1);
        assert_eq!(data[0].symbol, "USDCUSDT");
        assert!((data[0].price - 0.9998).abs() < 1e-9);
        assert!((data[0].change_24h - (-0.0002)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn balances_merge_trade_and_frozen_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/account/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": [{"id": 123, "type": "spot", "state": "working"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/account/accounts/123/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": {"list": [
                    {"currency": "usdt", "type": "trade", "balance": "90.0"},
                    {"currency": "usdt", "type": "frozen", "balance": "10.0"},
                    {"currency": "usdc", "type": "trade", "balance": "0.0"},
                ]}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let balances = exchange.account_balances().await.unwrap();

        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].asset, "USDT");
        assert!((balances[0].free - 90.0).abs() < 1e-9);
        assert!((balances[0].locked - 10.0).abs() < 1e-9);

        // Second call reuses the cached account id.
        let again = exchange.account_balances().await.unwrap();
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn trades_map_order_type_to_side() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/order/matchresults"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": [
                    {"symbol": "usdcusdt", "trade-id": 7, "price": "0.9997",
                     "filled-amount": "100", "filled-fees": "0.1",
                     "fee-currency": "usdt", "type": "sell-limit",
                     "created-at": 1_700_000_000_000i64},
                ]
            })))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let trades = exchange.recent_trades(50).await.unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, TradeSide::Sell);
        assert_eq!(trades[0].fee_asset, "USDT");
        assert_eq!(trades[0].trade_id, "7");
    }

    #[tokio::test]
    async fn logical_error_envelope_fails_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market/tickers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "err-msg": "system busy"
            })))
            .mount(&server)
            .await;

        let exchange = adapter(&server).await;
        let err = exchange.market_data(None).await.unwrap_err();

        assert!(err.to_string().contains("system busy"));
    }
}
