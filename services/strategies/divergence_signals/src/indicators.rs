//! Technical indicators for signal generation
//!
//! Every function here is a pure transform over closed candles. Output
//! vectors are aligned index-for-index with their input; `None` marks
//! positions without enough history and is never treated as zero.

use crate::candle::{Candle, CandleSeries};
use crate::config::IndicatorSettings;
use std::collections::BTreeMap;

/// Substitute for a zero average loss so RSI saturates instead of dividing by zero
pub const RSI_EPSILON: f64 = 1e-10;

pub const PIVOT_KEY: &str = "pivot";

pub fn ema_key(period: usize) -> String {
    format!("ema{}", period)
}

pub fn rsi_key(period: usize) -> String {
    format!("rsi{}", period)
}

/// Exponential moving average seeded with the first close.
///
/// Defined from index 0 onwards; a zero period yields an all-`None` series.
pub fn ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut previous: Option<f64> = None;

    closes
        .iter()
        .map(|&close| {
            let value = match previous {
                Some(prev) => alpha * close + (1.0 - alpha) * prev,
                None => close,
            };
            previous = Some(value);
            Some(value)
        })
        .collect()
}

/// Relative strength index using simple rolling means of gains and losses.
///
/// The first `period` entries are `None` (a window needs `period` deltas).
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; closes.len()];
    if period == 0 {
        return values;
    }

    for index in period..closes.len() {
        let (gain_sum, loss_sum) = closes[index - period..=index].windows(2).fold(
            (0.0, 0.0),
            |(gains, losses), pair| {
                let delta = pair[1] - pair[0];
                if delta > 0.0 {
                    (gains + delta, losses)
                } else {
                    (gains, losses - delta)
                }
            },
        );

        let avg_gain = gain_sum / period as f64;
        let mut avg_loss = loss_sum / period as f64;
        if avg_loss == 0.0 {
            avg_loss = RSI_EPSILON;
        }

        let rs = avg_gain / avg_loss;
        values[index] = Some(100.0 - 100.0 / (1.0 + rs));
    }

    values
}

/// Classic floor-trader pivot of a single bar
pub fn pivot(prev_high: f64, prev_low: f64, prev_close: f64) -> f64 {
    (prev_high + prev_low + prev_close) / 3.0
}

/// Pivot for each candle, computed from the candle before it
pub fn pivot_series(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(candles.len());
    if !candles.is_empty() {
        values.push(None);
    }
    values.extend(
        candles
            .windows(2)
            .map(|pair| Some(pivot(pair[0].high, pair[0].low, pair[0].close))),
    );
    values
}

/// Derived series keyed by name, aligned with a candle series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSeries {
    len: usize,
    series: BTreeMap<String, Vec<Option<f64>>>,
}

impl IndicatorSeries {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            series: BTreeMap::new(),
        }
    }

    /// Insert a series; it must be aligned with the candle series
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.len, "indicator series misaligned");
        self.series.insert(name.into(), values);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, name: &str) -> Option<&[Option<f64>]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// Defined values at the last index, for signal payloads
    pub fn latest_values(&self) -> BTreeMap<String, f64> {
        let Some(last) = self.len.checked_sub(1) else {
            return BTreeMap::new();
        };

        self.series
            .iter()
            .filter_map(|(name, values)| values[last].map(|v| (name.clone(), v)))
            .collect()
    }
}

/// Compute every series the detectors read
pub fn augment(series: &CandleSeries, settings: &IndicatorSettings) -> IndicatorSeries {
    let closes = series.closes();
    let mut indicators = IndicatorSeries::new(series.len());

    indicators.insert(ema_key(settings.ema_period), ema(&closes, settings.ema_period));
    indicators.insert(rsi_key(settings.rsi_period), rsi(&closes, settings.rsi_period));
    indicators.insert(PIVOT_KEY, pivot_series(series.candles()));

    indicators
}
