//! Polling driver
//!
//! Fetch, evaluate, deliver, sleep. One cycle runs to completion before the
//! next starts; shutdown is only observed between cycles.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::engine::{CycleOutcome, SignalEngine};
use crate::error::{EngineError, JournalError, NotifierError, Result};
use crate::journal::SignalJournal;
use crate::market_data::MarketDataSource;
use crate::notifier::Notifier;
use crate::signals::SignalRecord;
use crate::{log_backoff, log_cycle_error, log_metrics, log_signal, log_success};
use async_trait::async_trait;
use signal_strategy_shared::{MetricsCollector, Strategy, StrategyMetrics};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Everything one successful cycle produced
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub delivery_error: Option<NotifierError>,
    pub journal_error: Option<JournalError>,
}

/// Delay after `failures` consecutive failed cycles: doubles from `initial`,
/// never above `max`
pub fn backoff_delay(initial: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    initial.saturating_mul(1u32 << exponent).min(max)
}

pub struct DivergenceSignalStrategy {
    config: Arc<EngineConfig>,
    engine: SignalEngine,
    source: Arc<dyn MarketDataSource>,
    notifier: Arc<dyn Notifier>,
    journal: Arc<dyn SignalJournal>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    consecutive_failures: u32,
}

impl DivergenceSignalStrategy {
    pub fn new(
        config: Arc<EngineConfig>,
        source: Arc<dyn MarketDataSource>,
        notifier: Arc<dyn Notifier>,
        journal: Arc<dyn SignalJournal>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: SignalEngine::new(&config),
            config,
            source,
            notifier,
            journal,
            clock,
            metrics: Arc::new(MetricsCollector::new()),
            consecutive_failures: 0,
        }
    }

    /// Share an existing collector, e.g. with the command listener
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn engine(&self) -> &SignalEngine {
        &self.engine
    }

    /// Run one cycle.
    ///
    /// Only a failed fetch is an error. Delivery and journal failures are
    /// carried in the report; engine state advances regardless.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let series = self
            .source
            .fetch_recent_candles(
                &self.config.symbol,
                &self.config.timeframe,
                self.config.candle_limit,
            )
            .await?;

        self.metrics.increment_cycles();
        let outcome = self.engine.process(&series);
        if matches!(outcome, CycleOutcome::Evaluated { .. }) {
            self.metrics.increment_candles();
        }

        let mut report = CycleReport {
            outcome,
            delivery_error: None,
            journal_error: None,
        };

        let Some(signal) = report.outcome.emitted_signal().cloned() else {
            return Ok(report);
        };

        self.metrics.increment_signals();
        log_signal!(
            "{} {} {} @ {} (candle {})",
            self.config.symbol,
            self.config.timeframe,
            signal.kind,
            signal.price,
            signal.at_time
        );

        if let Err(e) = self.notifier.on_signal(&signal).await {
            warn!("Signal delivery failed, not retrying: {}", e);
            report.delivery_error = Some(e);
        }

        let record =
            SignalRecord::from_signal(&signal, &self.config.symbol, &self.config.timeframe);
        if let Err(e) = self.journal.append(&record).await {
            warn!("Failed to journal signal: {}", e);
            report.journal_error = Some(e);
        }

        Ok(report)
    }

    async fn handle_cycle_error(&mut self, error: EngineError) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.metrics.increment_errors();

        log_cycle_error!(
            "{} {} cycle failed ({} in a row): {}",
            self.config.symbol,
            self.config.timeframe,
            self.consecutive_failures,
            error
        );
        self.notifier.on_cycle_error(&error).await;

        let delay = backoff_delay(
            self.config.retry_backoff(),
            self.config.max_backoff(),
            self.consecutive_failures,
        );
        log_backoff!("Retrying in {:?}", delay);
        delay
    }
}

#[async_trait]
impl Strategy for DivergenceSignalStrategy {
    fn name(&self) -> &str {
        &self.config.service.name
    }

    async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        log_success!(
            "{} started for {} {} (every {:?})",
            self.name(),
            self.config.symbol,
            self.config.timeframe,
            self.config.poll_interval()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.run_cycle().await {
                Ok(report) => {
                    self.consecutive_failures = 0;
                    // only cycles that saw market data count as alive
                    self.metrics.record_heartbeat(self.clock.now_ms());
                    debug!("cycle outcome: {:?}", report.outcome);
                    self.config.poll_interval()
                }
                Err(e) => self.handle_cycle_error(e).await,
            };

            let clock = Arc::clone(&self.clock);
            tokio::select! {
                _ = clock.sleep(delay) => {}
                // only ever flips to true; a dropped sender also means stop
                _ = shutdown.changed() => break,
            }
        }

        let metrics = self.metrics.get_metrics();
        log_metrics!(
            "{} stopped: {} cycles, {} signals, {} errors",
            self.name(),
            metrics.cycles_completed,
            metrics.signals_emitted,
            metrics.errors
        );
        Ok(())
    }

    fn metrics(&self) -> StrategyMetrics {
        self.metrics.get_metrics()
    }
}
