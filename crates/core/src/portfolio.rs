//! USDT portfolio valuation shared by all exchange adapters.
//!
//! Valuation is a pure transform of a balance set and a price table. A
//! missing price is a normal case, not an error: the asset stays in the
//! breakdown at price 0.0 and contributes nothing to the total.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::types::{AssetValuation, Balance, MarketData, PortfolioValue};

/// Builds an asset -> USDT price table from ticker snapshots.
///
/// Every symbol ending in `USDT` contributes its base asset (suffix
/// stripped, separator characters trimmed, uppercased). Symbols quoted in
/// anything else are ignored.
#[must_use]
pub fn usdt_price_table(market_data: &[MarketData]) -> HashMap<String, f64> {
    let mut prices = HashMap::new();

    for data in market_data {
        let symbol = data.symbol.to_uppercase();
        if let Some(base) = symbol.strip_suffix("USDT") {
            let base = base.trim_end_matches(['/', '-', '_']);
            if !base.is_empty() {
                prices.insert(base.to_string(), data.price);
            }
        }
    }

    prices
}

/// Values a balance set against a USDT price table.
///
/// USDT itself always values at 1.0. Assets absent from the table are kept
/// in the breakdown with `price = 0.0` and `value_usdt = 0.0` and excluded
/// from the total, so unpriced holdings are detectable downstream.
#[must_use]
pub fn value_portfolio(
    balances: &[Balance],
    prices: &HashMap<String, f64>,
    timestamp: DateTime<Utc>,
) -> PortfolioValue {
    let mut total_value = 0.0;
    let mut assets = BTreeMap::new();

    for balance in balances {
        if balance.total <= 0.0 {
            continue;
        }

        let asset = balance.asset.to_uppercase();
        let price = if asset == "USDT" {
            1.0
        } else {
            match prices.get(&asset) {
                Some(price) => *price,
                None => {
                    tracing::debug!(asset = %asset, "no USDT price found for asset");
                    0.0
                }
            }
        };
        let value_usdt = balance.total * price;
        total_value += value_usdt;

        assets.insert(
            asset,
            AssetValuation {
                amount: balance.total,
                price,
                value_usdt,
            },
        );
    }

    PortfolioValue {
        total_value_usdt: total_value,
        assets,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(symbol: &str, price: f64) -> MarketData {
        MarketData {
            symbol: symbol.to_string(),
            price,
            volume_24h: 0.0,
            change_24h: 0.0,
            change_24h_percent: 0.0,
            high_24h: price,
            low_24h: price,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn price_table_strips_usdt_suffix() {
        let table = usdt_price_table(&[
            market("BTCUSDT", 60000.0),
            market("FDUSDUSDT", 0.9996),
            market("ETHBTC", 0.05),
        ]);

        assert_eq!(table.len(), 2);
        assert!((table["BTC"] - 60000.0).abs() < f64::EPSILON);
        assert!((table["FDUSD"] - 0.9996).abs() < f64::EPSILON);
        assert!(!table.contains_key("ETH"));
    }

    #[test]
    fn price_table_trims_separators() {
        let table = usdt_price_table(&[market("BTC/USDT", 60000.0)]);
        assert!((table["BTC"] - 60000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn usdt_always_values_at_one() {
        let now = Utc::now();
        let balances = vec![Balance::new("USDT", 500.0, 0.0, now)];

        let portfolio = value_portfolio(&balances, &HashMap::new(), now);

        assert!((portfolio.total_value_usdt - 500.0).abs() < f64::EPSILON);
        assert!((portfolio.assets["USDT"].price - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_equals_sum_of_priced_assets() {
        let now = Utc::now();
        let balances = vec![
            Balance::new("USDT", 100.0, 0.0, now),
            Balance::new("BTC", 0.5, 0.0, now),
            Balance::new("MYSTERY", 42.0, 0.0, now),
        ];
        let prices = HashMap::from([("BTC".to_string(), 60000.0)]);

        let portfolio = value_portfolio(&balances, &prices, now);

        let sum: f64 = portfolio.assets.values().map(|v| v.value_usdt).sum();
        assert!((portfolio.total_value_usdt - sum).abs() < 1e-9);
        assert!((portfolio.total_value_usdt - 30100.0).abs() < 1e-9);
    }

    #[test]
    fn unpriced_asset_stays_in_breakdown_at_zero() {
        let now = Utc::now();
        let balances = vec![Balance::new("MYSTERY", 42.0, 0.0, now)];

        let portfolio = value_portfolio(&balances, &HashMap::new(), now);

        assert!((portfolio.total_value_usdt).abs() < f64::EPSILON);
        let valuation = &portfolio.assets["MYSTERY"];
        assert!((valuation.amount - 42.0).abs() < f64::EPSILON);
        assert!(valuation.price.abs() < f64::EPSILON);
        assert!(valuation.value_usdt.abs() < f64::EPSILON);
        assert_eq!(portfolio.unpriced_assets(), vec!["MYSTERY"]);
    }

    #[test]
    fn zero_balances_are_skipped() {
        let now = Utc::now();
        let balances = vec![Balance::new("DUST", 0.0, 0.0, now)];

        let portfolio = value_portfolio(&balances, &HashMap::new(), now);

        assert!(portfolio.assets.is_empty());
    }
}
