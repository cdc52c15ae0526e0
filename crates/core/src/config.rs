//! Configuration structs for the collector.
//!
//! Loaded once at startup (see [`crate::config_loader`]) and treated as
//! immutable afterwards: each adapter receives its own `ExchangeConfig`
//! at construction and never mutates it.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Collection cadence and limits.
    pub collection: CollectionConfig,
    /// Time-series sink connection.
    pub influx: InfluxConfig,
    /// Per-exchange settings, keyed by exchange name (e.g., "binance").
    pub exchanges: BTreeMap<String, ExchangeConfig>,
    /// Stablecoin arbitrage bookkeeping.
    pub arbitrage: ArbitrageSettings,
}

impl AppConfig {
    /// Returns the names of exchanges with the enabled flag set.
    #[must_use]
    pub fn enabled_exchanges(&self) -> Vec<&str> {
        self.exchanges
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Collection cadence and concurrency limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Minutes between collection rounds, measured from the end of one
    /// round to the start of the sleep.
    pub interval_minutes: u64,
    /// Maximum per-exchange collection tasks in flight at once.
    pub concurrent_requests: usize,
    /// Seconds between health-metric emissions.
    pub health_check_interval_secs: u64,
    /// Maximum recent trades fetched per exchange per round.
    pub trade_limit: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            concurrent_requests: 5,
            health_check_interval_secs: 60,
            trade_limit: 50,
        }
    }
}

/// InfluxDB v2 connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Base URL, e.g. `http://localhost:8086`.
    pub url: String,
    /// API token.
    pub token: String,
    /// Organization name.
    pub org: String,
    /// Target bucket.
    pub bucket: String,
    /// Write request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            org: "scoa".to_string(),
            bucket: "trading_data".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Settings for one exchange account.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Whether the exchange participates in collection at all.
    pub enabled: bool,
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Use the exchange's sandbox/testnet environment where available.
    pub sandbox: bool,
    /// Trading pairs to monitor.
    pub symbols: Vec<String>,
    /// Requests per minute allowed against this exchange.
    pub rate_limit: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ExchangeConfig {
    /// Returns true when both credential fields are non-empty.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_secret: String::new(),
            sandbox: false,
            symbols: Vec::new(),
            rate_limit: 100,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &"[redacted]")
            .field("api_secret", &"[redacted]")
            .field("sandbox", &self.sandbox)
            .field("symbols", &self.symbols)
            .field("rate_limit", &self.rate_limit)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Stablecoin arbitrage bookkeeping settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitrageSettings {
    /// Capital baseline for cumulative PnL.
    pub initial_capital: f64,
    /// Per-leg transaction fee rate (0.001 = 0.1%).
    pub fee_rate: f64,
    /// Minimum absolute spread percent before an action is suggested.
    pub spread_threshold_pct: f64,
    /// First venue of the tracked pair.
    pub venue_a: String,
    /// Second venue of the tracked pair.
    pub venue_b: String,
    /// Stablecoin pair tracked on the first venue.
    pub symbol_a: String,
    /// Stablecoin pair tracked on the second venue.
    pub symbol_b: String,
    /// Days of in-memory history to retain; `None` keeps everything.
    pub history_retention_days: Option<i64>,
}

impl Default for ArbitrageSettings {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            fee_rate: 0.001,
            spread_threshold_pct: 0.05,
            venue_a: "binance".to_string(),
            venue_b: "htx".to_string(),
            symbol_a: "FDUSDUSDT".to_string(),
            symbol_b: "USDCUSDT".to_string(),
            history_retention_days: None,
        }
    }
}
