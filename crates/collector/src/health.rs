//! Background health-check loop.
//!
//! Runs independently of round timing for the lifetime of the running
//! state and is explicitly shut down (not just abandoned) when the
//! orchestrator stops, so no health metric can be emitted after shutdown
//! begins.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scoa_influx::{MetricsSink, SinkError};

use crate::stats::CollectionStats;

/// Commands to control the health monitor.
#[derive(Debug, Clone)]
pub enum HealthCommand {
    /// Emit a health report immediately.
    ReportNow,
    /// Gracefully shut the monitor down.
    Shutdown,
}

/// Periodically emits orchestrator-wide counters to the sink.
pub struct HealthMonitor {
    interval: Duration,
    stats: Arc<RwLock<CollectionStats>>,
    sink: Arc<dyn MetricsSink>,
    exchanges_active: usize,
}

impl HealthMonitor {
    /// Creates a monitor reporting every `interval`.
    #[must_use]
    pub fn new(
        interval: Duration,
        stats: Arc<RwLock<CollectionStats>>,
        sink: Arc<dyn MetricsSink>,
        exchanges_active: usize,
    ) -> Self {
        Self {
            interval,
            stats,
            sink,
            exchanges_active,
        }
    }

    /// Spawns the background loop and returns a command channel plus the
    /// task handle.
    ///
    /// The task runs until a `Shutdown` command arrives or the channel
    /// closes.
    pub fn spawn(self) -> (mpsc::Sender<HealthCommand>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(8);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(interval_secs = self.interval.as_secs(), "health monitor started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.report().await {
                            warn!(error = %e, "failed to write health metrics");
                        }
                    }
                    cmd = rx.recv() => match cmd {
                        Some(HealthCommand::ReportNow) => {
                            if let Err(e) = self.report().await {
                                warn!(error = %e, "failed to write health metrics");
                            }
                        }
                        Some(HealthCommand::Shutdown) | None => {
                            info!("health monitor shutting down");
                            break;
                        }
                    }
                }
            }
        });

        (tx, handle)
    }

    async fn report(&self) -> Result<(), SinkError> {
        let stats = self.stats.read().await.clone();

        let metrics = [
            (
                "collections_completed",
                stats.collections_completed as f64,
            ),
            ("collections_failed", stats.collections_failed as f64),
            ("exchanges_active", self.exchanges_active as f64),
            ("total_runtime_seconds", stats.total_runtime_secs),
            ("memory_usage_mb", memory_usage_mb()),
        ];

        self.sink.write_health_metrics(&metrics).await?;
        debug!(
            completed = stats.collections_completed,
            failed = stats.collections_failed,
            "health check"
        );
        Ok(())
    }
}

/// Returns the process's resident set size in megabytes, or 0.0 when it
/// cannot be determined (non-Linux hosts, unreadable procfs).
#[must_use]
pub fn memory_usage_mb() -> f64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status.lines().find_map(|line| {
                let rest = line.strip_prefix("VmRSS:")?;
                let kb: f64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
                Some(kb / 1024.0)
            })
        })
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    use scoa_core::types::{Balance, MarketData, PortfolioValue, Trade};

    /// Counts health-metric writes for cancellation assertions.
    #[derive(Clone, Default)]
    struct CountingSink {
        health_writes: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl MetricsSink for CountingSink {
        async fn write_balances(
            &self,
            _exchange: &str,
            _balances: &[Balance],
        ) -> Result<(), SinkError> {
            Ok(())
        }

        async fn write_trades(&self, _exchange: &str, _trades: &[Trade]) -> Result<(), SinkError> {
            Ok(())
        }

        async fn write_market_data(
            &self,
            _exchange: &str,
            _data: &[MarketData],
        ) -> Result<(), SinkError> {
            Ok(())
        }

        async fn write_portfolio_value(
            &self,
            _exchange: &str,
            _portfolio: &PortfolioValue,
        ) -> Result<(), SinkError> {
            Ok(())
        }

        async fn write_health_metrics(&self, _metrics: &[(&str, f64)]) -> Result<(), SinkError> {
            *self.health_writes.lock().unwrap() += 1;
            Ok(())
        }

        async fn write_strategy_pnl(
            &self,
            _exchange: &str,
            _total_value_usdt: f64,
            _timestamp: DateTime<Utc>,
        ) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn memory_usage_is_non_negative() {
        assert!(memory_usage_mb() >= 0.0);
    }

    #[tokio::test]
    async fn shutdown_stops_further_emissions() {
        let sink = CountingSink::default();
        let monitor = HealthMonitor::new(
            Duration::from_millis(10),
            Arc::new(RwLock::new(CollectionStats::default())),
            Arc::new(sink.clone()),
            2,
        );

        let (tx, handle) = monitor.spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(HealthCommand::Shutdown).await.unwrap();
        handle.await.unwrap();

        let writes_at_shutdown = *sink.health_writes.lock().unwrap();
        assert!(writes_at_shutdown >= 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*sink.health_writes.lock().unwrap(), writes_at_shutdown);
    }

    #[tokio::test]
    async fn report_now_emits_on_demand() {
        let sink = CountingSink::default();
        let monitor = HealthMonitor::new(
            Duration::from_secs(3_600),
            Arc::new(RwLock::new(CollectionStats::default())),
            Arc::new(sink.clone()),
            0,
        );

        let (tx, handle) = monitor.spawn();

        // First interval tick fires immediately; wait for it, then ask for
        // another report on demand.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(HealthCommand::ReportNow).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(*sink.health_writes.lock().unwrap() >= 2);

        tx.send(HealthCommand::Shutdown).await.unwrap();
        handle.await.unwrap();
    }
}
