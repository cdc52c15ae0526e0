//! Records produced by the arbitrage calculator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which leg to take on a detected price spread.
///
/// Venue "a" and "b" refer to the calculator's configured venue pair, in
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Venue a is cheap relative to venue b.
    BuyASellB,
    /// Venue b is cheap relative to venue a.
    BuyBSellA,
    /// Spread is inside the threshold; do nothing.
    NoAction,
}

impl SuggestedAction {
    /// Returns the snake_case wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::BuyASellB => "buy_a_sell_b",
            SuggestedAction::BuyBSellA => "buy_b_sell_a",
            SuggestedAction::NoAction => "no_action",
        }
    }
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected price spread between two venues for a stablecoin pair.
///
/// Appended to an in-memory ordered history; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    /// When the spread was observed.
    pub timestamp: DateTime<Utc>,
    /// Price on the first venue.
    pub price_a: f64,
    /// Price on the second venue.
    pub price_b: f64,
    /// Absolute spread (`price_a - price_b`).
    pub spread: f64,
    /// Spread relative to the midpoint, as a percentage.
    pub spread_percent: f64,
    /// Suggested direction, `NoAction` inside the threshold.
    pub suggested_action: SuggestedAction,
    /// Spread percent remaining after both legs' fees, clamped at zero.
    pub potential_profit_percent: f64,
}

impl ArbitrageOpportunity {
    /// Returns true when the suggested action is not `NoAction`.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.suggested_action != SuggestedAction::NoAction
    }
}

/// One time-stamped PnL snapshot across the tracked venues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnLData {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Combined USDT value across venues.
    pub total_value_usdt: f64,
    /// Per-venue USDT value, keyed by venue name.
    pub exchange_values: BTreeMap<String, f64>,
    /// Change vs. the previous entry, nonzero only across a calendar-day
    /// boundary.
    pub daily_pnl: f64,
    /// `daily_pnl` relative to the previous entry's total, as a percentage.
    pub daily_pnl_percent: f64,
    /// Change vs. initial capital.
    pub cumulative_pnl: f64,
    /// `cumulative_pnl` relative to initial capital, as a percentage.
    pub cumulative_pnl_percent: f64,
}

/// Statistics derived from the full PnL history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Latest cumulative PnL percent.
    pub total_return_percent: f64,
    /// Cumulative PnL percent prorated to a 365-day year.
    pub annualized_return_percent: f64,
    /// Peak-to-trough percent decline from the running maximum value.
    pub max_drawdown_percent: f64,
    /// Annualized mean of period returns over their annualized standard
    /// deviation; 0 with fewer than two period returns.
    pub sharpe_ratio: f64,
    /// Days since the first history entry, at least 1.
    pub days_running: i64,
    /// Latest total value.
    pub current_value_usdt: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_action_wire_names() {
        assert_eq!(SuggestedAction::BuyASellB.as_str(), "buy_a_sell_b");
        assert_eq!(SuggestedAction::BuyBSellA.as_str(), "buy_b_sell_a");
        assert_eq!(SuggestedAction::NoAction.as_str(), "no_action");
    }

    #[test]
    fn suggested_action_serializes_snake_case() {
        let json = serde_json::to_string(&SuggestedAction::BuyBSellA).unwrap();
        assert_eq!(json, "\"buy_b_sell_a\"");
    }

    #[test]
    fn opportunity_actionable_only_outside_threshold() {
        let opportunity = ArbitrageOpportunity {
            timestamp: Utc::now(),
            price_a: 1.0,
            price_b: 1.0,
            spread: 0.0,
            spread_percent: 0.0,
            suggested_action: SuggestedAction::NoAction,
            potential_profit_percent: 0.0,
        };
        assert!(!opportunity.is_actionable());
    }
}
