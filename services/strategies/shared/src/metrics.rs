//! Strategy metrics collection

use crate::StrategyMetrics;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

const NO_HEARTBEAT: i64 = i64::MIN;

/// Thread-safe metrics collector for strategies
///
/// Shared between the polling loop (writer) and status readers such as the
/// operator command listener. Everything is an atomic so readers never
/// contend with the loop.
#[derive(Debug)]
pub struct MetricsCollector {
    start_time: Instant,
    cycles_completed: AtomicU64,
    candles_processed: AtomicU64,
    signals_emitted: AtomicU64,
    errors: AtomicU64,
    last_heartbeat_ms: AtomicI64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles_completed: AtomicU64::new(0),
            candles_processed: AtomicU64::new(0),
            signals_emitted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_heartbeat_ms: AtomicI64::new(NO_HEARTBEAT),
        }
    }

    pub fn increment_cycles(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_candles(&self) {
        self.candles_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_signals(&self) {
        self.signals_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful cycle at `now_ms`; failed cycles leave it untouched
    pub fn record_heartbeat(&self, now_ms: i64) {
        self.last_heartbeat_ms.store(now_ms, Ordering::Release);
    }

    pub fn last_heartbeat_ms(&self) -> Option<i64> {
        match self.last_heartbeat_ms.load(Ordering::Acquire) {
            NO_HEARTBEAT => None,
            ms => Some(ms),
        }
    }

    /// Whether a heartbeat was seen within `max_silence_ms` of `now_ms`
    pub fn is_alive(&self, now_ms: i64, max_silence_ms: i64) -> bool {
        self.last_heartbeat_ms()
            .map(|last| now_ms.saturating_sub(last) <= max_silence_ms)
            .unwrap_or(false)
    }

    pub fn get_metrics(&self) -> StrategyMetrics {
        StrategyMetrics {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            candles_processed: self.candles_processed.load(Ordering::Relaxed),
            signals_emitted: self.signals_emitted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_heartbeat_ms: self.last_heartbeat_ms(),
            uptime_secs: self.uptime().as_secs(),
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
