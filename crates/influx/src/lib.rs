//! InfluxDB v2 time-series sink.
//!
//! This crate provides:
//! - [`Point`]: a typed time-series point with line-protocol encoding
//! - [`MetricsSink`]: the write boundary the orchestrator drives; every
//!   collected record lands here as a typed point batch
//! - [`InfluxSink`]: the InfluxDB v2 implementation over the HTTP write API
//!
//! Writes are fire-and-forget from the orchestrator's perspective, but
//! each write is attempted synchronously enough that failures surface as
//! [`SinkError`] for the caller to log; a failed batch is dropped, never
//! retried here.

pub mod point;
pub mod sink;

pub use point::{FieldValue, Point};
pub use sink::{InfluxSink, MetricsSink, SinkError};
