//! Candle and candle-series types

use crate::error::SeriesError;
use serde::{Deserialize, Serialize};

/// One closed OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time in epoch milliseconds
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Lookback window of closed candles, oldest first.
///
/// Construction guarantees strictly increasing `open_time`; the last element
/// is the most recently closed candle and the still-forming bar is never
/// part of the series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for (index, pair) in candles.windows(2).enumerate() {
            if pair[1].open_time <= pair[0].open_time {
                return Err(SeriesError::OutOfOrder {
                    index: index + 1,
                    open_time: pair[1].open_time,
                    previous: pair[0].open_time,
                });
            }
        }
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn latest_open_time(&self) -> Option<i64> {
        self.last().map(|c| c.open_time)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Keep only the newest `limit` candles
    pub fn truncate_front(&mut self, limit: usize) {
        if self.candles.len() > limit {
            let excess = self.candles.len() - limit;
            self.candles.drain(..excess);
        }
    }
}
