//! In-memory fakes for driving the engine without network or wall-clock time

use crate::candle::{Candle, CandleSeries};
use crate::clock::Clock;
use crate::error::{DataSourceError, EngineError, JournalError, NotifierError};
use crate::journal::SignalJournal;
use crate::market_data::MarketDataSource;
use crate::notifier::Notifier;
use crate::signals::{Signal, SignalRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Replays a script of fetch results. Once exhausted, the last successful
/// window is returned again.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<Candle>, String>>>,
    last: Mutex<Option<Vec<Candle>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<Candle>, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    async fn fetch_recent_candles(
        &self,
        _symbol: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<CandleSeries, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = self.script.lock().pop_front();
        let candles = match step {
            Some(Ok(candles)) => {
                *self.last.lock() = Some(candles.clone());
                candles
            }
            Some(Err(message)) => return Err(DataSourceError::Unavailable { message }),
            None => self.last.lock().clone().ok_or_else(|| DataSourceError::Unavailable {
                message: "script exhausted".to_string(),
            })?,
        };

        let mut series = CandleSeries::new(candles)?;
        series.truncate_front(limit);
        Ok(series)
    }
}

/// Captures deliveries; can be told to reject them
#[derive(Default)]
pub struct RecordingNotifier {
    signals: Mutex<Vec<Signal>>,
    cycle_errors: Mutex<Vec<String>>,
    fail_deliveries: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail_deliveries.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn cycle_errors(&self) -> Vec<String> {
        self.cycle_errors.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn on_signal(&self, signal: &Signal) -> Result<(), NotifierError> {
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(NotifierError::Delivery {
                message: "recording notifier set to fail".to_string(),
            });
        }
        self.signals.lock().push(signal.clone());
        Ok(())
    }

    async fn on_cycle_error(&self, error: &EngineError) {
        self.cycle_errors.lock().push(error.to_string());
    }
}

#[derive(Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<SignalRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SignalRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl SignalJournal for MemoryJournal {
    async fn append(&self, record: &SignalRecord) -> Result<(), JournalError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Clock whose sleeps return immediately and advance `now`.
///
/// Optionally requests shutdown after a fixed number of sleeps.
pub struct ManualClock {
    now_ms: AtomicI64,
    sleeps: Mutex<Vec<Duration>>,
    stop: Mutex<Option<(usize, watch::Sender<bool>)>>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
            sleeps: Mutex::new(Vec::new()),
            stop: Mutex::new(None),
        }
    }

    /// Send `true` on `shutdown` once `sleeps` sleeps have been requested
    pub fn stop_after(self, sleeps: usize, shutdown: watch::Sender<bool>) -> Self {
        *self.stop.lock() = Some((sleeps, shutdown));
        self
    }

    pub fn set_now_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.now_ms
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);

        let count = {
            let mut sleeps = self.sleeps.lock();
            sleeps.push(duration);
            sleeps.len()
        };

        {
            let stop = self.stop.lock();
            if let Some((limit, shutdown)) = stop.as_ref() {
                if count >= *limit {
                    let _ = shutdown.send(true);
                }
            }
        }

        tokio::task::yield_now().await;
    }
}

/// Candles whose open is the previous close, with a 0.05 wick either side
pub fn candles_from_closes(start_ms: i64, step_ms: i64, closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                start_ms + i as i64 * step_ms,
                open,
                open.max(close) + 0.05,
                open.min(close) - 0.05,
                close,
                1.0,
            )
        })
        .collect()
}

/// 300 closes: a long slow climb, a sharp flush, a bounce, a shallower
/// second low with stronger RSI, a grind up and a final close back above
/// the EMA near the pivot.
///
/// With EMA 12, RSI 14 and swing order 3 the last candle is a Long; the
/// first 299 alone are not.
pub fn bullish_reversal_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..260u32).map(|i| 90.0 + 0.04 * f64::from(i)).collect();

    let mut extend = |count: usize, delta: f64| {
        for _ in 0..count {
            let next = closes[closes.len() - 1] + delta;
            closes.push(next);
        }
    };
    extend(4, -2.0);
    extend(6, 1.0);
    extend(8, -0.8);
    extend(20, 0.1);
    extend(1, -0.6);

    closes.push(93.65);
    closes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversal_fixture_shape() {
        let closes = bullish_reversal_closes();
        assert_eq!(closes.len(), 300);
        assert!((closes[298] - 93.36).abs() < 1e-6);
        assert_eq!(closes[299], 93.65);
    }

    #[test]
    fn test_candles_chain_opens() {
        let candles = candles_from_closes(0, 60_000, &[10.0, 11.0]);
        assert_eq!(candles[1].open, 10.0);
        assert!((candles[1].high - 11.05).abs() < 1e-9);
        assert!((candles[1].low - 9.95).abs() < 1e-9);
        assert_eq!(candles[1].open_time, 60_000);
    }

    #[tokio::test]
    async fn test_scripted_source_repeats_last_window() {
        let candles = candles_from_closes(0, 60_000, &[1.0, 2.0, 3.0]);
        let source = ScriptedSource::new(vec![Ok(candles), Err("boom".to_string())]);

        assert_eq!(source.fetch_recent_candles("X", "1m", 2).await.unwrap().len(), 2);
        assert!(source.fetch_recent_candles("X", "1m", 2).await.is_err());
        assert_eq!(
            source.fetch_recent_candles("X", "1m", 10).await.unwrap().len(),
            3
        );
        assert_eq!(source.calls(), 3);
    }
}
