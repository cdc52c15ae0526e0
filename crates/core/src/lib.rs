//! Core types, traits, and configuration for the SCOA data collector.
//!
//! This crate provides:
//! - Shared data records for balances, trades, tickers, and portfolio values
//! - The [`Exchange`] capability trait implemented by every exchange adapter
//! - The shared [`ExchangeError`] taxonomy used across adapters
//! - USDT portfolio valuation shared by all adapters
//! - Configuration structs and the figment-based loader

pub mod config;
pub mod config_loader;
pub mod error;
pub mod exchange;
pub mod portfolio;
pub mod types;

pub use config::{
    AppConfig, ArbitrageSettings, CollectionConfig, ExchangeConfig, InfluxConfig,
};
pub use config_loader::ConfigLoader;
pub use error::ExchangeError;
pub use exchange::Exchange;
pub use portfolio::{usdt_price_table, value_portfolio};
pub use types::{AssetValuation, Balance, MarketData, PortfolioValue, Trade, TradeSide};
