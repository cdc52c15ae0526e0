//! The capability set every exchange adapter implements.

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ExchangeError;
use crate::portfolio::{usdt_price_table, value_portfolio};
use crate::types::{Balance, MarketData, PortfolioValue, Trade};

/// Common collection capabilities of an exchange account.
///
/// The orchestrator only ever holds `Arc<dyn Exchange>` values; it never
/// needs to know concrete adapter types. Per-call failures surface as
/// [`ExchangeError`] and mean "no data this cycle" to the caller, not a
/// fatal condition.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Name of the exchange (e.g., "binance").
    fn name(&self) -> &str;

    /// Returns true only if the exchange is configured enabled AND both
    /// credential fields are non-empty. This is the single gate the
    /// orchestrator uses to include an adapter in a collection round.
    fn is_enabled(&self) -> bool;

    /// Establishes connectivity. An adapter that fails here is excluded
    /// from collection for the process lifetime.
    ///
    /// # Errors
    /// Returns an error if the exchange is unreachable or rejects the
    /// configured credentials.
    async fn initialize(&self) -> Result<(), ExchangeError>;

    /// Cheap, side-effect-free liveness probe.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    async fn test_connection(&self) -> Result<bool, ExchangeError>;

    /// Fetches account balances, returning only assets with `total > 0`.
    ///
    /// # Errors
    /// Returns an error on transport or authentication failure.
    async fn account_balances(&self) -> Result<Vec<Balance>, ExchangeError>;

    /// Fetches 24h ticker snapshots.
    ///
    /// With `symbols = None` the adapter's configured symbol list is used.
    /// One entry is returned per requested symbol found; symbols the
    /// exchange does not know are silently omitted.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    async fn market_data(&self, symbols: Option<&[String]>)
        -> Result<Vec<MarketData>, ExchangeError>;

    /// Fetches recent fills across the configured symbols, merged and
    /// sorted most-recent-first, truncated to `limit`.
    ///
    /// # Errors
    /// Returns an error on transport or authentication failure.
    async fn recent_trades(&self, limit: usize) -> Result<Vec<Trade>, ExchangeError>;

    /// Computes the USDT valuation of the account's holdings.
    ///
    /// Provided here so every adapter shares identical valuation logic:
    /// balances and tickers are fetched through the adapter, then valued
    /// through [`value_portfolio`].
    ///
    /// # Errors
    /// Returns an error if either underlying fetch fails.
    async fn portfolio_value(&self) -> Result<PortfolioValue, ExchangeError> {
        let balances = self.account_balances().await?;
        let market_data = self.market_data(None).await?;
        let prices = usdt_price_table(&market_data);

        Ok(value_portfolio(&balances, &prices, Utc::now()))
    }

    /// Releases any held connection. Idempotent.
    async fn close(&self) {}
}
