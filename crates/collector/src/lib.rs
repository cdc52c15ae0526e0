//! Multi-exchange collection orchestrator.
//!
//! This crate drives the periodic collection cycle: it owns the set of
//! active exchange adapters, fans out per-exchange work concurrently,
//! tolerates partial failures, feeds the portfolio valuer and arbitrage
//! calculator, and forwards everything to the time-series sink. A
//! separately scheduled health-check loop reports orchestrator-wide
//! counters to the same sink.

pub mod health;
pub mod orchestrator;
pub mod registry;
pub mod stats;

pub use health::{HealthCommand, HealthMonitor};
pub use orchestrator::{CollectionOrchestrator, CollectorState, OrchestratorStatus};
pub use stats::CollectionStats;
