//! Stablecoin spread detection and PnL bookkeeping.
//!
//! This crate provides:
//! - [`ArbitrageCalculator`]: records price spreads between two venues and
//!   point-in-time PnL snapshots, keeping both in append-only in-memory
//!   histories
//! - Read-side snapshot queries over those histories
//! - Derived performance statistics (drawdown, annualized return, a
//!   simplified Sharpe ratio)
//!
//! The calculator is single-writer by design: only the collection loop
//! appends; other consumers read owned snapshots.

pub mod calculator;
pub mod types;

pub use calculator::ArbitrageCalculator;
pub use types::{ArbitrageOpportunity, PerformanceStats, PnLData, SuggestedAction};
