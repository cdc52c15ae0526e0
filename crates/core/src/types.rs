//! Data records produced by exchange adapters.
//!
//! Every record carries its own UTC timestamp so downstream time-series
//! writes preserve collection time rather than write time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One asset's holding on one exchange at a point in time.
///
/// `total` is always `free + locked`; use [`Balance::new`] so the invariant
/// holds at construction instead of being re-derived downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Asset symbol (e.g., "USDT", "FDUSD").
    pub asset: String,
    /// Amount available for trading.
    pub free: f64,
    /// Amount locked in open orders.
    pub locked: f64,
    /// Total holding (`free + locked`).
    pub total: f64,
    /// When the balance was observed.
    pub timestamp: DateTime<Utc>,
}

impl Balance {
    /// Creates a balance, deriving `total` from `free + locked`.
    #[must_use]
    pub fn new(asset: impl Into<String>, free: f64, locked: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            asset: asset.into(),
            free,
            locked,
            total: free + locked,
            timestamp,
        }
    }
}

/// Side of an executed fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Returns the lowercase wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executed fill reported by an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trading pair (e.g., "FDUSDUSDT").
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Filled base amount.
    pub amount: f64,
    /// Fill price.
    pub price: f64,
    /// Fee charged for the fill.
    pub fee: f64,
    /// Asset the fee was charged in.
    pub fee_asset: String,
    /// Execution time.
    pub timestamp: DateTime<Utc>,
    /// Exchange-assigned trade id.
    pub trade_id: String,
}

impl Trade {
    /// Returns the notional value of the fill (`amount * price`).
    #[must_use]
    pub fn value(&self) -> f64 {
        self.amount * self.price
    }
}

/// A 24h ticker snapshot for one trading pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    /// Trading pair (e.g., "BTCUSDT").
    pub symbol: String,
    /// Last traded price.
    pub price: f64,
    /// 24h base volume.
    pub volume_24h: f64,
    /// Absolute 24h price change.
    pub change_24h: f64,
    /// 24h price change as a percentage.
    pub change_24h_percent: f64,
    /// 24h high.
    pub high_24h: f64,
    /// 24h low.
    pub low_24h: f64,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// One asset's contribution to a portfolio valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetValuation {
    /// Total holding of the asset.
    pub amount: f64,
    /// USDT price used for the valuation; 0.0 when no price was found.
    pub price: f64,
    /// USDT value (`amount * price`); 0.0 when no price was found.
    pub value_usdt: f64,
}

/// Normalized USDT valuation of one exchange's holdings.
///
/// Assets without a discoverable USDT price stay in the breakdown with
/// `price = 0.0` and are excluded from `total_value_usdt`, so unpriced
/// holdings remain visible to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValue {
    /// Sum of all priced per-asset USDT values.
    pub total_value_usdt: f64,
    /// Per-asset breakdown, keyed by asset symbol.
    pub assets: BTreeMap<String, AssetValuation>,
    /// When the valuation was computed.
    pub timestamp: DateTime<Utc>,
}

impl PortfolioValue {
    /// Returns the assets that could not be priced in USDT.
    #[must_use]
    pub fn unpriced_assets(&self) -> Vec<&str> {
        self.assets
            .iter()
            .filter(|(asset, v)| v.price == 0.0 && asset.as_str() != "USDT")
            .map(|(asset, _)| asset.as_str())
            .collect()
    }
}
