//! The collection orchestrator: periodic rounds, two-level concurrent
//! fan-out, partial-failure accounting, and the strategy-PnL pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{mpsc, watch, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use scoa_arbitrage::ArbitrageCalculator;
use scoa_core::config::AppConfig;
use scoa_core::exchange::Exchange;
use scoa_core::portfolio::usdt_price_table;
use scoa_core::types::{Balance, MarketData, PortfolioValue};
use scoa_influx::MetricsSink;

use crate::health::{HealthCommand, HealthMonitor};
use crate::registry::build_adapter;
use crate::stats::CollectionStats;

/// Lifecycle states of the orchestrator. Failures within a round never
/// change the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Stopped,
    Initializing,
    Running,
    Stopping,
}

/// Snapshot of the orchestrator's state for reporting.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    /// Current lifecycle state.
    pub state: CollectorState,
    /// Names of the active exchanges.
    pub exchanges: Vec<String>,
    /// Counter snapshot.
    pub stats: CollectionStats,
}

/// What one exchange produced during a round's main fan-out.
///
/// `None` means the sub-collection call failed; an `Ok` call with an empty
/// payload is still a success, so "failed" and "returned nothing" stay
/// distinguishable.
struct ExchangeOutcome {
    exchange: String,
    balances: Option<Vec<Balance>>,
    market_data: Option<Vec<MarketData>>,
    trades_ok: bool,
    portfolio: Option<PortfolioValue>,
    succeeded: usize,
}

impl ExchangeOutcome {
    fn skipped(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            balances: None,
            market_data: None,
            trades_ok: false,
            portfolio: None,
            succeeded: 0,
        }
    }
}

/// Owns the active adapters and drives the periodic collection cycle.
pub struct CollectionOrchestrator {
    config: AppConfig,
    sink: Arc<dyn MetricsSink>,
    adapters: Vec<(String, Arc<dyn Exchange>)>,
    calculator: ArbitrageCalculator,
    stats: Arc<RwLock<CollectionStats>>,
    state: CollectorState,
}

impl CollectionOrchestrator {
    /// Creates an orchestrator; adapters are constructed in
    /// [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(config: AppConfig, sink: Arc<dyn MetricsSink>) -> Self {
        let calculator = ArbitrageCalculator::new(config.arbitrage.clone());
        Self {
            config,
            sink,
            adapters: Vec::new(),
            calculator,
            stats: Arc::new(RwLock::new(CollectionStats::default())),
            state: CollectorState::Stopped,
        }
    }

    /// Creates an orchestrator over pre-built adapters, bypassing the
    /// registry. Useful for embedding and testing.
    #[must_use]
    pub fn with_adapters(
        config: AppConfig,
        sink: Arc<dyn MetricsSink>,
        adapters: Vec<(String, Arc<dyn Exchange>)>,
    ) -> Self {
        let mut orchestrator = Self::new(config, sink);
        orchestrator.adapters = adapters;
        orchestrator
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Returns the arbitrage calculator for read-side queries.
    #[must_use]
    pub fn calculator(&self) -> &ArbitrageCalculator {
        &self.calculator
    }

    /// Returns a status snapshot.
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            state: self.state,
            exchanges: self.adapters.iter().map(|(n, _)| n.clone()).collect(),
            stats: self.stats.read().await.clone(),
        }
    }

    /// Constructs and initializes one adapter per enabled exchange entry.
    ///
    /// An adapter that fails to construct or initialize is logged and
    /// excluded for the process lifetime; it does not abort startup.
    ///
    /// # Errors
    /// Fails only when zero adapters initialize successfully.
    pub async fn initialize(&mut self) -> Result<()> {
        self.state = CollectorState::Initializing;

        let enabled = self.config.enabled_exchanges();
        info!(exchanges = ?enabled, "initializing exchanges");

        for (name, exchange_config) in &self.config.exchanges {
            if !exchange_config.enabled {
                debug!(exchange = %name, "exchange disabled, skipping");
                continue;
            }

            let adapter = match build_adapter(name, exchange_config) {
                Ok(adapter) => adapter,
                Err(e) => {
                    error!(exchange = %name, error = %e, "failed to create exchange");
                    continue;
                }
            };

            if !adapter.is_enabled() {
                warn!(exchange = %name, "exchange missing credentials, skipping");
                continue;
            }

            match adapter.initialize().await {
                Ok(()) => {
                    info!(exchange = %name, "exchange initialized");
                    self.adapters.push((name.clone(), adapter));
                }
                Err(e) => {
                    error!(exchange = %name, error = %e, "failed to initialize exchange");
                }
            }
        }

        if self.adapters.is_empty() {
            self.state = CollectorState::Stopped;
            bail!("no exchanges were successfully initialized");
        }

        info!(count = self.adapters.len(), "data collector initialized");
        Ok(())
    }

    /// Runs the collection loop until `shutdown` flips to true, then stops.
    ///
    /// The interval is measured from the end of one round to the start of
    /// the sleep; there is no drift compensation. An in-flight round always
    /// finishes before shutdown proceeds, so sink writes are never cut off
    /// mid-round.
    ///
    /// # Errors
    /// Currently infallible; the `Result` reserves room for fatal runtime
    /// conditions.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.state = CollectorState::Running;
        self.stats.write().await.mark_started(Utc::now());

        let interval = Duration::from_secs(self.config.collection.interval_minutes * 60);
        info!(
            interval_secs = interval.as_secs(),
            "starting data collection"
        );

        let monitor = HealthMonitor::new(
            Duration::from_secs(self.config.collection.health_check_interval_secs),
            Arc::clone(&self.stats),
            Arc::clone(&self.sink),
            self.adapters.len(),
        );
        let (health_tx, health_handle) = monitor.spawn();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let round_start = Instant::now();
            self.run_round().await;
            info!(
                duration_secs = round_start.elapsed().as_secs_f64(),
                "data collection completed"
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.stop(health_tx, health_handle).await;
        Ok(())
    }

    /// Runs one collection round: the per-exchange fan-out, result
    /// aggregation, then the strategy-PnL pass.
    async fn run_round(&mut self) {
        let semaphore = Arc::new(Semaphore::new(
            self.config.collection.concurrent_requests.max(1),
        ));
        let trade_limit = self.config.collection.trade_limit;

        let tasks = self.adapters.iter().map(|(name, adapter)| {
            let semaphore = Arc::clone(&semaphore);
            let sink = Arc::clone(&self.sink);
            let name = name.clone();
            let adapter = Arc::clone(adapter);
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                collect_exchange(&name, adapter.as_ref(), sink.as_ref(), trade_limit).await
            }
        });

        // join_all preserves adapter order in the outcome list.
        let outcomes: Vec<ExchangeOutcome> = join_all(tasks).await;

        let successful = outcomes.iter().filter(|o| o.succeeded > 0).count() as u64;
        let failed = outcomes.len() as u64 - successful;

        self.stats
            .write()
            .await
            .record_round(successful, failed, Utc::now());

        if failed > 0 {
            warn!(successful, failed, "collection round completed with failures");
        } else {
            info!(successful, "collection round completed");
        }

        self.collect_strategy_pnl(&outcomes).await;
    }

    /// The strategy-PnL pass: one `strategy_pnl` point per exchange with a
    /// positive portfolio value, plus the cross-exchange spread and PnL
    /// bookkeeping. Starts only after the main fan-out has fully joined.
    async fn collect_strategy_pnl(&mut self, outcomes: &[ExchangeOutcome]) {
        let now = Utc::now();

        let tasks = self
            .adapters
            .iter()
            .zip(outcomes)
            .map(|((name, adapter), outcome)| {
                let sink = Arc::clone(&self.sink);
                let name = name.clone();
                let adapter = Arc::clone(adapter);
                let portfolio = outcome.portfolio.clone();
                async move {
                    // Reuse the fan-out's portfolio value when present.
                    let portfolio = match portfolio {
                        Some(p) => p,
                        None => match adapter.portfolio_value().await {
                            Ok(p) => p,
                            Err(e) => {
                                error!(exchange = %name, error = %e,
                                    "failed to collect strategy PnL");
                                return;
                            }
                        },
                    };

                    if portfolio.total_value_usdt > 0.0 {
                        if let Err(e) = sink
                            .write_strategy_pnl(&name, portfolio.total_value_usdt, now)
                            .await
                        {
                            error!(exchange = %name, error = %e,
                                "failed to write strategy PnL");
                        }
                        debug!(exchange = %name, total = portfolio.total_value_usdt,
                            "strategy PnL recorded");
                    }
                }
            });

        join_all(tasks).await;
        self.update_calculator(outcomes, now);
        info!("strategy PnL collection completed");
    }

    /// Feeds the round's market data and balances into the arbitrage
    /// calculator. The collection pass is the calculator's only writer.
    fn update_calculator(&mut self, outcomes: &[ExchangeOutcome], now: DateTime<Utc>) {
        let settings = self.calculator.settings().clone();
        let outcome_for = |venue: &str| outcomes.iter().find(|o| o.exchange == venue);

        let price_on = |venue: &str, symbol: &str| {
            outcome_for(venue)
                .and_then(|o| o.market_data.as_deref())
                .and_then(|data| data.iter().find(|m| m.symbol.eq_ignore_ascii_case(symbol)))
                .map(|m| m.price)
        };

        if let (Some(price_a), Some(price_b)) = (
            price_on(&settings.venue_a, &settings.symbol_a),
            price_on(&settings.venue_b, &settings.symbol_b),
        ) {
            let opportunity = self.calculator.record_opportunity(price_a, price_b, Some(now));
            if opportunity.is_actionable() {
                info!(
                    spread_percent = opportunity.spread_percent,
                    action = %opportunity.suggested_action,
                    potential_profit_percent = opportunity.potential_profit_percent,
                    "stablecoin spread detected"
                );
            } else {
                debug!(
                    spread_percent = opportunity.spread_percent,
                    "stablecoin spread inside threshold"
                );
            }
        }

        let all_market: Vec<MarketData> = outcomes
            .iter()
            .filter_map(|o| o.market_data.clone())
            .flatten()
            .collect();
        let stable_prices = usdt_price_table(&all_market);

        let balances_a = outcome_for(&settings.venue_a).and_then(|o| o.balances.clone());
        let balances_b = outcome_for(&settings.venue_b).and_then(|o| o.balances.clone());
        if let (Some(balances_a), Some(balances_b)) = (balances_a, balances_b) {
            let pnl =
                self.calculator
                    .record_pnl(&balances_a, &balances_b, &stable_prices, Some(now));
            debug!(
                total_value_usdt = pnl.total_value_usdt,
                cumulative_pnl = pnl.cumulative_pnl,
                "PnL snapshot recorded"
            );
        }
    }

    /// Stops the orchestrator: shuts the health loop down, closes every
    /// adapter, and reports final counters.
    async fn stop(
        &mut self,
        health_tx: mpsc::Sender<HealthCommand>,
        health_handle: JoinHandle<()>,
    ) {
        info!("stopping data collection service");
        self.state = CollectorState::Stopping;

        // Explicit cancellation: the monitor acknowledges shutdown before
        // we proceed, so no health metric fires after Stopped.
        let _ = health_tx.send(HealthCommand::Shutdown).await;
        let _ = health_handle.await;

        for (name, adapter) in &self.adapters {
            adapter.close().await;
            info!(exchange = %name, "closed connection");
        }

        self.state = CollectorState::Stopped;

        let stats = self.stats.read().await.clone();
        info!(
            runtime_secs = stats.total_runtime_secs,
            completed = stats.collections_completed,
            failed = stats.collections_failed,
            "data collection stopped"
        );
    }
}

/// Collects one exchange's four data types concurrently, forwarding each
/// to the sink as it becomes available.
async fn collect_exchange(
    name: &str,
    adapter: &dyn Exchange,
    sink: &dyn MetricsSink,
    trade_limit: usize,
) -> ExchangeOutcome {
    if !adapter.is_enabled() {
        warn!(exchange = name, "exchange not enabled");
        return ExchangeOutcome::skipped(name);
    }

    debug!(exchange = name, "collecting data");

    let (balances, market_data, trades_ok, portfolio) = tokio::join!(
        collect_balances(name, adapter, sink),
        collect_market_data(name, adapter, sink),
        collect_trades(name, adapter, sink, trade_limit),
        collect_portfolio(name, adapter, sink),
    );

    let succeeded = usize::from(balances.is_some())
        + usize::from(market_data.is_some())
        + usize::from(trades_ok)
        + usize::from(portfolio.is_some());

    if succeeded == 4 {
        debug!(exchange = name, "collected all data types");
    } else {
        warn!(
            exchange = name,
            succeeded,
            total = 4,
            "partial collection"
        );
    }

    ExchangeOutcome {
        exchange: name.to_string(),
        balances,
        market_data,
        trades_ok,
        portfolio,
        succeeded,
    }
}

async fn collect_balances(
    name: &str,
    adapter: &dyn Exchange,
    sink: &dyn MetricsSink,
) -> Option<Vec<Balance>> {
    match adapter.account_balances().await {
        Ok(balances) => {
            if let Err(e) = sink.write_balances(name, &balances).await {
                error!(exchange = name, error = %e, "failed to write balances");
            }
            Some(balances)
        }
        Err(e) => {
            error!(exchange = name, error = %e, "failed to collect balances");
            None
        }
    }
}

async fn collect_market_data(
    name: &str,
    adapter: &dyn Exchange,
    sink: &dyn MetricsSink,
) -> Option<Vec<MarketData>> {
    match adapter.market_data(None).await {
        Ok(data) => {
            if let Err(e) = sink.write_market_data(name, &data).await {
                error!(exchange = name, error = %e, "failed to write market data");
            }
            Some(data)
        }
        Err(e) => {
            error!(exchange = name, error = %e, "failed to collect market data");
            None
        }
    }
}

async fn collect_trades(
    name: &str,
    adapter: &dyn Exchange,
    sink: &dyn MetricsSink,
    limit: usize,
) -> bool {
    match adapter.recent_trades(limit).await {
        Ok(trades) => {
            if let Err(e) = sink.write_trades(name, &trades).await {
                error!(exchange = name, error = %e, "failed to write trades");
            }
            true
        }
        Err(e) => {
            error!(exchange = name, error = %e, "failed to collect trades");
            false
        }
    }
}

async fn collect_portfolio(
    name: &str,
    adapter: &dyn Exchange,
    sink: &dyn MetricsSink,
) -> Option<PortfolioValue> {
    match adapter.portfolio_value().await {
        Ok(portfolio) => {
            if portfolio.total_value_usdt > 0.0 {
                if let Err(e) = sink.write_portfolio_value(name, &portfolio).await {
                    error!(exchange = name, error = %e, "failed to write portfolio value");
                }
            }
            Some(portfolio)
        }
        Err(e) => {
            error!(exchange = name, error = %e, "failed to collect portfolio value");
            None
        }
    }
}
