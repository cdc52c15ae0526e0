//! Spread and PnL calculator for a stablecoin venue pair.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use scoa_core::config::ArbitrageSettings;
use scoa_core::types::Balance;

use crate::types::{ArbitrageOpportunity, PerformanceStats, PnLData, SuggestedAction};

/// Records spreads between two venues and running PnL against an initial
/// capital baseline.
///
/// Both histories are append-only and time-ordered by insertion. The
/// orchestrator's collection pass is the only writer; queries return owned
/// snapshots so readers never observe partial mutation.
pub struct ArbitrageCalculator {
    settings: ArbitrageSettings,
    opportunities: Vec<ArbitrageOpportunity>,
    pnl_history: Vec<PnLData>,
}

impl ArbitrageCalculator {
    /// Creates a calculator for the venue pair named in `settings`.
    #[must_use]
    pub fn new(settings: ArbitrageSettings) -> Self {
        Self {
            settings,
            opportunities: Vec::new(),
            pnl_history: Vec::new(),
        }
    }

    /// Returns the configured settings.
    #[must_use]
    pub fn settings(&self) -> &ArbitrageSettings {
        &self.settings
    }

    /// Records a price spread between the two venues.
    ///
    /// `spread_percent` is the spread relative to the midpoint of the two
    /// prices. The suggested action points at the cheap venue once the
    /// spread clears the configured threshold; the potential profit nets
    /// out both legs' fees and clamps at zero.
    pub fn record_opportunity(
        &mut self,
        price_a: f64,
        price_b: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> ArbitrageOpportunity {
        let timestamp = timestamp.unwrap_or_else(Utc::now);

        let spread = price_a - price_b;
        let midpoint = (price_a + price_b) / 2.0;
        let spread_percent = if midpoint > 0.0 {
            spread / midpoint * 100.0
        } else {
            0.0
        };

        let fee_drag = self.settings.fee_rate * 2.0 * 100.0;
        let potential_profit_percent = (spread_percent.abs() - fee_drag).max(0.0);

        let suggested_action = if spread_percent > self.settings.spread_threshold_pct {
            SuggestedAction::BuyBSellA
        } else if spread_percent < -self.settings.spread_threshold_pct {
            SuggestedAction::BuyASellB
        } else {
            SuggestedAction::NoAction
        };

        let opportunity = ArbitrageOpportunity {
            timestamp,
            price_a,
            price_b,
            spread,
            spread_percent,
            suggested_action,
            potential_profit_percent,
        };

        self.opportunities.push(opportunity.clone());
        self.prune_opportunities();
        opportunity
    }

    /// Records a PnL snapshot from both venues' balances.
    ///
    /// Balances are valued through the stablecoin price table (USDT at 1.0,
    /// FDUSD/USDC at their tracked price, defaulting to 1:1 when no live
    /// tick is available). Daily PnL is nonzero only when `timestamp`
    /// falls on a different calendar date than the most recent entry, and
    /// is computed against that entry's total.
    pub fn record_pnl(
        &mut self,
        balances_a: &[Balance],
        balances_b: &[Balance],
        stable_prices: &HashMap<String, f64>,
        timestamp: Option<DateTime<Utc>>,
    ) -> PnLData {
        let timestamp = timestamp.unwrap_or_else(Utc::now);

        let value_a = stable_value_usdt(balances_a, stable_prices);
        let value_b = stable_value_usdt(balances_b, stable_prices);
        let total_value = value_a + value_b;

        let cumulative_pnl = total_value - self.settings.initial_capital;
        let cumulative_pnl_percent = if self.settings.initial_capital > 0.0 {
            cumulative_pnl / self.settings.initial_capital * 100.0
        } else {
            0.0
        };

        let mut daily_pnl = 0.0;
        let mut daily_pnl_percent = 0.0;
        if let Some(last) = self.pnl_history.last() {
            if timestamp.date_naive() != last.timestamp.date_naive() {
                daily_pnl = total_value - last.total_value_usdt;
                if last.total_value_usdt > 0.0 {
                    daily_pnl_percent = daily_pnl / last.total_value_usdt * 100.0;
                }
            }
        }

        let mut exchange_values = BTreeMap::new();
        exchange_values.insert(self.settings.venue_a.clone(), value_a);
        exchange_values.insert(self.settings.venue_b.clone(), value_b);

        let pnl = PnLData {
            timestamp,
            total_value_usdt: total_value,
            exchange_values,
            daily_pnl,
            daily_pnl_percent,
            cumulative_pnl,
            cumulative_pnl_percent,
        };

        self.pnl_history.push(pnl.clone());
        self.prune_pnl();
        pnl
    }

    /// Returns opportunities observed within the last `hours` hours.
    #[must_use]
    pub fn recent_opportunities(&self, hours: i64) -> Vec<ArbitrageOpportunity> {
        let cutoff = Utc::now() - Duration::hours(hours);
        self.opportunities
            .iter()
            .filter(|o| o.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Returns PnL entries recorded within the last `days` days.
    #[must_use]
    pub fn recent_pnl(&self, days: i64) -> Vec<PnLData> {
        let cutoff = Utc::now() - Duration::days(days);
        self.pnl_history
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Derives performance statistics from the full PnL history.
    ///
    /// Returns `None` for an empty history. A single-entry history yields
    /// a Sharpe ratio of 0.
    #[must_use]
    pub fn performance_stats(&self) -> Option<PerformanceStats> {
        let latest = self.pnl_history.last()?;
        let first = self.pnl_history.first()?;

        // Drawdown from the running maximum, seeded with initial capital.
        let mut max_value = self.settings.initial_capital;
        let mut max_drawdown = 0.0f64;
        for pnl in &self.pnl_history {
            max_value = max_value.max(pnl.total_value_usdt);
            if max_value > 0.0 {
                let drawdown = (max_value - pnl.total_value_usdt) / max_value * 100.0;
                max_drawdown = max_drawdown.max(drawdown);
            }
        }

        let days_running = (Utc::now() - first.timestamp).num_days().max(1);
        let annualized_return_percent =
            latest.cumulative_pnl_percent / days_running as f64 * 365.0;

        let returns: Vec<f64> = self
            .pnl_history
            .windows(2)
            .filter(|w| w[0].total_value_usdt > 0.0)
            .map(|w| (w[1].total_value_usdt - w[0].total_value_usdt) / w[0].total_value_usdt)
            .collect();

        let sharpe_ratio = if returns.is_empty() {
            0.0
        } else {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let annualized_mean = mean * 365.0;
            let annualized_std = if returns.len() > 1 {
                let variance = returns
                    .iter()
                    .map(|r| (r - mean).powi(2))
                    .sum::<f64>()
                    / (returns.len() - 1) as f64;
                variance.sqrt() * 365.0f64.sqrt()
            } else {
                0.0
            };
            if annualized_std > 0.0 {
                annualized_mean / annualized_std
            } else {
                0.0
            }
        };

        Some(PerformanceStats {
            total_return_percent: latest.cumulative_pnl_percent,
            annualized_return_percent,
            max_drawdown_percent: max_drawdown,
            sharpe_ratio,
            days_running,
            current_value_usdt: latest.total_value_usdt,
        })
    }

    /// Number of recorded opportunities.
    #[must_use]
    pub fn opportunity_count(&self) -> usize {
        self.opportunities.len()
    }

    /// Number of recorded PnL entries.
    #[must_use]
    pub fn pnl_count(&self) -> usize {
        self.pnl_history.len()
    }

    fn prune_opportunities(&mut self) {
        if let Some(cutoff) = self.retention_cutoff(self.opportunities.last().map(|o| o.timestamp))
        {
            self.opportunities.retain(|o| o.timestamp >= cutoff);
        }
    }

    fn prune_pnl(&mut self) {
        if let Some(cutoff) = self.retention_cutoff(self.pnl_history.last().map(|p| p.timestamp)) {
            self.pnl_history.retain(|p| p.timestamp >= cutoff);
        }
    }

    fn retention_cutoff(&self, newest: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        let days = self.settings.history_retention_days?;
        Some(newest? - Duration::days(days))
    }
}

/// Values a balance set in USDT using only stablecoin conversions.
///
/// USDT counts at face value; FDUSD and USDC convert at their tracked
/// price, defaulting to 1:1 when absent from the table. Other assets are
/// ignored here since the tracked strategy only holds stablecoins.
fn stable_value_usdt(balances: &[Balance], prices: &HashMap<String, f64>) -> f64 {
    let mut total = 0.0;

    for balance in balances {
        if balance.total <= 0.0 {
            continue;
        }
        match balance.asset.to_uppercase().as_str() {
            "USDT" => total += balance.total,
            "FDUSD" => total += balance.total * prices.get("FDUSD").copied().unwrap_or(1.0),
            "USDC" => total += balance.total * prices.get("USDC").copied().unwrap_or(1.0),
            other => debug!(asset = other, "skipping asset without stablecoin valuation"),
        }
    }

    total
}
