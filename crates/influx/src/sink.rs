//! The metrics sink boundary and its InfluxDB v2 implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use scoa_core::config::InfluxConfig;
use scoa_core::types::{Balance, MarketData, PortfolioValue, Trade};

use crate::point::Point;

/// Errors from writing to the time-series store.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Network-level failure.
    #[error("sink network error: {0}")]
    Network(String),

    /// Write API returned a non-success status.
    #[error("sink API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body.
        message: String,
    },
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Write boundary for collected time-series data.
///
/// Implementations must attempt each write synchronously enough that a
/// failure is observable by the caller; callers log failures and drop the
/// batch — a sink error never aborts a collection round.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Writes one `account_balance` point per balance.
    async fn write_balances(&self, exchange: &str, balances: &[Balance])
        -> Result<(), SinkError>;

    /// Writes one `trades` point per fill.
    async fn write_trades(&self, exchange: &str, trades: &[Trade]) -> Result<(), SinkError>;

    /// Writes one `market_data` point per ticker snapshot.
    async fn write_market_data(&self, exchange: &str, data: &[MarketData])
        -> Result<(), SinkError>;

    /// Writes the portfolio total plus one point per asset.
    async fn write_portfolio_value(
        &self,
        exchange: &str,
        portfolio: &PortfolioValue,
    ) -> Result<(), SinkError>;

    /// Writes one `health_metrics` point per (metric, value) pair.
    async fn write_health_metrics(&self, metrics: &[(&str, f64)]) -> Result<(), SinkError>;

    /// Writes one `strategy_pnl` point for an exchange's total value.
    async fn write_strategy_pnl(
        &self,
        exchange: &str,
        total_value_usdt: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError>;
}

/// InfluxDB v2 sink over the HTTP write API.
pub struct InfluxSink {
    http: reqwest::Client,
    url: String,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxSink {
    /// Creates a sink from connection settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
        })
    }

    /// Probes the server's health endpoint.
    ///
    /// The original deployment tolerates an empty bucket, so callers treat
    /// a failed ping as a warning rather than a startup failure.
    ///
    /// # Errors
    /// Returns an error if the server is unreachable or unhealthy.
    pub async fn ping(&self) -> Result<(), SinkError> {
        let url = format!("{}/health", self.url);
        let response = self.http.get(&url).send().await?;

        if response.status().is_success() {
            info!(url = %self.url, "time-series store reachable");
            Ok(())
        } else {
            Err(SinkError::Api {
                status_code: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// Writes a batch of points, skipping field-less points.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx response.
    pub async fn write_points(&self, points: &[Point]) -> Result<(), SinkError> {
        let body: Vec<String> = points
            .iter()
            .filter(|p| !p.is_empty())
            .map(Point::to_line_protocol)
            .collect();

        if body.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            self.url, self.org, self.bucket
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body.join("\n"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SinkError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        debug!(count = body.len(), "wrote points");
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    async fn write_balances(
        &self,
        exchange: &str,
        balances: &[Balance],
    ) -> Result<(), SinkError> {
        let points: Vec<Point> = balances
            .iter()
            .map(|b| {
                Point::new("account_balance", b.timestamp)
                    .tag("exchange", exchange)
                    .tag("asset", &b.asset)
                    .field("free", b.free)
                    .field("locked", b.locked)
                    .field("total", b.total)
            })
            .collect();

        self.write_points(&points).await?;
        if !points.is_empty() {
            info!(exchange, count = points.len(), "wrote balance records");
        }
        Ok(())
    }

    async fn write_trades(&self, exchange: &str, trades: &[Trade]) -> Result<(), SinkError> {
        let points: Vec<Point> = trades
            .iter()
            .map(|t| {
                Point::new("trades", t.timestamp)
                    .tag("exchange", exchange)
                    .tag("symbol", &t.symbol)
                    .tag("side", t.side.as_str())
                    .tag("trade_id", &t.trade_id)
                    .field("amount", t.amount)
                    .field("price", t.price)
                    .field("value", t.value())
                    .field("fee", t.fee)
                    .field_str("fee_asset", &t.fee_asset)
            })
            .collect();

        self.write_points(&points).await?;
        if !points.is_empty() {
            info!(exchange, count = points.len(), "wrote trade records");
        }
        Ok(())
    }

    async fn write_market_data(
        &self,
        exchange: &str,
        data: &[MarketData],
    ) -> Result<(), SinkError> {
        let points: Vec<Point> = data
            .iter()
            .map(|d| {
                Point::new("market_data", d.timestamp)
                    .tag("exchange", exchange)
                    .tag("symbol", &d.symbol)
                    .field("price", d.price)
                    .field("volume_24h", d.volume_24h)
                    .field("change_24h", d.change_24h)
                    .field("change_24h_percent", d.change_24h_percent)
                    .field("high_24h", d.high_24h)
                    .field("low_24h", d.low_24h)
            })
            .collect();

        self.write_points(&points).await?;
        if !points.is_empty() {
            info!(exchange, count = points.len(), "wrote market data records");
        }
        Ok(())
    }

    async fn write_portfolio_value(
        &self,
        exchange: &str,
        portfolio: &PortfolioValue,
    ) -> Result<(), SinkError> {
        let mut points = vec![Point::new("portfolio_value", portfolio.timestamp)
            .tag("exchange", exchange)
            .tag("type", "total")
            .field("value_usdt", portfolio.total_value_usdt)];

        for (asset, valuation) in &portfolio.assets {
            points.push(
                Point::new("portfolio_value", portfolio.timestamp)
                    .tag("exchange", exchange)
                    .tag("type", "asset")
                    .tag("asset", asset)
                    .field("amount", valuation.amount)
                    .field("value_usdt", valuation.value_usdt)
                    .field("price", valuation.price),
            );
        }

        self.write_points(&points).await?;
        info!(exchange, "wrote portfolio value");
        Ok(())
    }

    async fn write_health_metrics(&self, metrics: &[(&str, f64)]) -> Result<(), SinkError> {
        let now = Utc::now();
        let points: Vec<Point> = metrics
            .iter()
            .map(|(name, value)| {
                Point::new("health_metrics", now)
                    .tag("metric", *name)
                    .field("value", *value)
            })
            .collect();

        self.write_points(&points).await?;
        debug!(count = points.len(), "wrote health metrics");
        Ok(())
    }

    async fn write_strategy_pnl(
        &self,
        exchange: &str,
        total_value_usdt: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let point = Point::new("strategy_pnl", timestamp)
            .tag("exchange", exchange)
            .tag("strategy", "stablecoin_arbitrage")
            .field("total_value_usdt", total_value_usdt);

        self.write_points(&[point]).await?;
        debug!(exchange, total_value_usdt, "wrote strategy PnL");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoa_core::types::TradeSide;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> InfluxConfig {
        InfluxConfig {
            url: url.to_string(),
            token: "test-token".to_string(),
            org: "scoa".to_string(),
            bucket: "trading_data".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn write_balances_posts_line_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/write"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = InfluxSink::new(&test_config(&server.uri())).unwrap();
        let balances = vec![Balance::new("USDT", 10.0, 0.0, Utc::now())];

        sink.write_balances("binance", &balances).await.unwrap();
    }

    #[tokio::test]
    async fn empty_batch_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/write"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let sink = InfluxSink::new(&test_config(&server.uri())).unwrap();
        sink.write_balances("binance", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/write"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let sink = InfluxSink::new(&test_config(&server.uri())).unwrap();
        let trades = vec![Trade {
            symbol: "FDUSDUSDT".to_string(),
            side: TradeSide::Buy,
            amount: 1.0,
            price: 1.0,
            fee: 0.0,
            fee_asset: "FDUSD".to_string(),
            timestamp: Utc::now(),
            trade_id: "1".to_string(),
        }];

        let err = sink.write_trades("binance", &trades).await.unwrap_err();
        assert!(matches!(err, SinkError::Api { status_code: 401, .. }));
    }

    #[tokio::test]
    async fn ping_hits_health_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = InfluxSink::new(&test_config(&server.uri())).unwrap();
        sink.ping().await.unwrap();
    }
}
