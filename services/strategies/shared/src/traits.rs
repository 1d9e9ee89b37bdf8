//! Strategy traits and interfaces

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

/// Core trait for long-running signal strategies
#[async_trait]
pub trait Strategy: Send {
    /// Strategy name for identification
    fn name(&self) -> &str;

    /// Run until the shutdown channel carries `true`.
    ///
    /// Implementations observe shutdown between cycles only, never in the
    /// middle of an evaluation.
    async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<()>;

    /// Get current strategy metrics
    fn metrics(&self) -> StrategyMetrics;
}

/// Point-in-time strategy metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyMetrics {
    pub cycles_completed: u64,
    pub candles_processed: u64,
    pub signals_emitted: u64,
    pub errors: u64,
    /// Epoch-ms of the last cycle that fetched market data successfully
    pub last_heartbeat_ms: Option<i64>,
    pub uptime_secs: u64,
}

/// Strategy configuration trait
pub trait StrategyConfig: Send + Sync + Clone {
    /// Validate configuration
    fn validate(&self) -> Result<()>;
}
