//! Pattern detectors
//!
//! A detector looks at the augmented window and answers one question about
//! the last (just closed) candle. Earlier candles are only ever used as
//! history; no detector reclassifies them.

use crate::candle::CandleSeries;
use crate::config::{DetectorSettings, IndicatorSettings};
use crate::error::{EngineError, Result};
use crate::indicators::{ema_key, rsi_key, IndicatorSeries, PIVOT_KEY};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    EmaCrossover,
    PivotProximity,
    RsiRangeDivergence,
    RsiSwingDivergence,
    RsiBias,
}

impl DetectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::EmaCrossover => "ema_crossover",
            DetectorKind::PivotProximity => "pivot_proximity",
            DetectorKind::RsiRangeDivergence => "rsi_range_divergence",
            DetectorKind::RsiSwingDivergence => "rsi_swing_divergence",
            DetectorKind::RsiBias => "rsi_bias",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
    None,
}

/// What a detector saw when it made its call
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    None,
    Crossover {
        previous_close: f64,
        previous_ema: f64,
        close: f64,
        ema: f64,
    },
    Proximity {
        pivot: f64,
        distance: f64,
    },
    Range {
        window_max_close: f64,
        window_min_close: f64,
        window_max_rsi: f64,
        window_min_rsi: f64,
        rsi: f64,
    },
    /// Indices of the older and newer extremum
    Swing {
        first: usize,
        second: usize,
    },
    Bias {
        rsi: f64,
        midline: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub detector: DetectorKind,
    pub fired: bool,
    pub direction: Direction,
    pub evidence: Evidence,
}

impl DetectionResult {
    pub fn idle(detector: DetectorKind) -> Self {
        Self::quiet(detector, Evidence::None)
    }

    fn quiet(detector: DetectorKind, evidence: Evidence) -> Self {
        Self {
            detector,
            fired: false,
            direction: Direction::None,
            evidence,
        }
    }

    fn fired(detector: DetectorKind, direction: Direction, evidence: Evidence) -> Self {
        Self {
            detector,
            fired: true,
            direction,
            evidence,
        }
    }
}

/// A named condition evaluated on the last candle of the window
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Evaluate the last candle.
    ///
    /// Missing indicators or too little history are reported as
    /// `EngineError::InsufficientHistory`.
    fn detect(
        &self,
        candles: &CandleSeries,
        indicators: &IndicatorSeries,
    ) -> Result<DetectionResult>;
}

fn series<'a>(indicators: &'a IndicatorSeries, key: &str) -> Result<&'a [Option<f64>]> {
    indicators
        .get(key)
        .ok_or_else(|| EngineError::insufficient(key, 1, 0))
}

fn defined(values: &[Option<f64>], index: usize, key: &str) -> Result<f64> {
    values
        .get(index)
        .copied()
        .flatten()
        .ok_or_else(|| EngineError::insufficient(key, index + 1, values.len()))
}

/// Direction of a close/EMA cross between two consecutive candles.
///
/// Touching the EMA on either candle is not a cross.
pub fn crossover_direction(
    previous_close: f64,
    previous_ema: f64,
    close: f64,
    ema: f64,
) -> Direction {
    if previous_close < previous_ema && close > ema {
        Direction::Bullish
    } else if previous_close > previous_ema && close < ema {
        Direction::Bearish
    } else {
        Direction::None
    }
}

#[derive(Debug, Clone)]
pub struct EmaCrossover {
    ema_key: String,
}

impl EmaCrossover {
    pub fn new(ema_period: usize) -> Self {
        Self {
            ema_key: ema_key(ema_period),
        }
    }
}

impl Detector for EmaCrossover {
    fn kind(&self) -> DetectorKind {
        DetectorKind::EmaCrossover
    }

    fn detect(
        &self,
        candles: &CandleSeries,
        indicators: &IndicatorSeries,
    ) -> Result<DetectionResult> {
        let n = candles.len();
        if n < 2 {
            return Err(EngineError::insufficient(&self.ema_key, 2, n));
        }

        let ema = series(indicators, &self.ema_key)?;
        let previous_ema = defined(ema, n - 2, &self.ema_key)?;
        let current_ema = defined(ema, n - 1, &self.ema_key)?;
        let previous_close = candles.candles()[n - 2].close;
        let close = candles.candles()[n - 1].close;

        let evidence = Evidence::Crossover {
            previous_close,
            previous_ema,
            close,
            ema: current_ema,
        };

        Ok(
            match crossover_direction(previous_close, previous_ema, close, current_ema) {
                Direction::None => DetectionResult::quiet(self.kind(), evidence),
                direction => DetectionResult::fired(self.kind(), direction, evidence),
            },
        )
    }
}

#[derive(Debug, Clone)]
pub struct PivotProximity {
    tolerance: f64,
}

impl PivotProximity {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl Detector for PivotProximity {
    fn kind(&self) -> DetectorKind {
        DetectorKind::PivotProximity
    }

    fn detect(
        &self,
        candles: &CandleSeries,
        indicators: &IndicatorSeries,
    ) -> Result<DetectionResult> {
        let n = candles.len();
        if n < 3 {
            return Err(EngineError::insufficient(PIVOT_KEY, 3, n));
        }

        let pivot = defined(series(indicators, PIVOT_KEY)?, n - 1, PIVOT_KEY)?;
        if pivot <= 0.0 {
            return Ok(DetectionResult::idle(self.kind()));
        }

        let close = candles.candles()[n - 1].close;
        let distance = (close - pivot).abs() / pivot;
        let evidence = Evidence::Proximity { pivot, distance };

        if distance <= self.tolerance {
            Ok(DetectionResult::fired(self.kind(), Direction::None, evidence))
        } else {
            Ok(DetectionResult::quiet(self.kind(), evidence))
        }
    }
}

/// Single-point divergence against the prior window's extremes
#[derive(Debug, Clone)]
pub struct RsiRangeDivergence {
    rsi_key: String,
    lookback: usize,
}

impl RsiRangeDivergence {
    pub fn new(rsi_period: usize, lookback: usize) -> Self {
        Self {
            rsi_key: rsi_key(rsi_period),
            lookback,
        }
    }
}

impl Detector for RsiRangeDivergence {
    fn kind(&self) -> DetectorKind {
        DetectorKind::RsiRangeDivergence
    }

    fn detect(
        &self,
        candles: &CandleSeries,
        indicators: &IndicatorSeries,
    ) -> Result<DetectionResult> {
        let n = candles.len();
        if self.lookback == 0 || n < self.lookback + 1 {
            return Err(EngineError::insufficient(&self.rsi_key, self.lookback + 1, n));
        }

        let rsi = series(indicators, &self.rsi_key)?;
        let current_rsi = defined(rsi, n - 1, &self.rsi_key)?;
        let close = candles.candles()[n - 1].close;
        let window = (n - 1 - self.lookback)..(n - 1);

        let closes = &candles.candles()[window.clone()];
        let window_max_close = closes.iter().map(|c| c.close).fold(f64::NEG_INFINITY, f64::max);
        let window_min_close = closes.iter().map(|c| c.close).fold(f64::INFINITY, f64::min);

        let window_rsi: Vec<f64> = rsi[window].iter().flatten().copied().collect();
        if window_rsi.is_empty() {
            return Err(EngineError::insufficient(&self.rsi_key, self.lookback + 1, n));
        }
        let window_max_rsi = window_rsi.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let window_min_rsi = window_rsi.iter().copied().fold(f64::INFINITY, f64::min);

        let evidence = Evidence::Range {
            window_max_close,
            window_min_close,
            window_max_rsi,
            window_min_rsi,
            rsi: current_rsi,
        };

        let direction = if close > window_max_close && current_rsi < window_max_rsi {
            Direction::Bearish
        } else if close < window_min_close && current_rsi > window_min_rsi {
            Direction::Bullish
        } else {
            Direction::None
        };

        Ok(match direction {
            Direction::None => DetectionResult::quiet(self.kind(), evidence),
            direction => DetectionResult::fired(self.kind(), direction, evidence),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Minimum,
    Maximum,
}

/// Indices in `start..closes.len()` that are local extrema.
///
/// A point qualifies when it is <= (minimum) or >= (maximum) every point
/// within `order` positions on both sides, and that whole neighbourhood lies
/// inside `start..closes.len()`.
pub fn local_extrema(closes: &[f64], start: usize, order: usize, kind: Extremum) -> Vec<usize> {
    let n = closes.len();
    if order == 0 || n < start + 2 * order + 1 {
        return Vec::new();
    }

    (start + order..n - order)
        .filter(|&i| {
            let centre = closes[i];
            (i - order..=i + order)
                .filter(|&k| k != i)
                .all(|k| match kind {
                    Extremum::Minimum => centre <= closes[k],
                    Extremum::Maximum => centre >= closes[k],
                })
        })
        .collect()
}

/// Divergence between the two most recent swing extrema
#[derive(Debug, Clone)]
pub struct RsiSwingDivergence {
    rsi_key: String,
    lookback: usize,
    order: usize,
}

impl RsiSwingDivergence {
    pub fn new(rsi_period: usize, lookback: usize, order: usize) -> Self {
        Self {
            rsi_key: rsi_key(rsi_period),
            lookback,
            order,
        }
    }

    fn last_pair(
        &self,
        closes: &[f64],
        rsi: &[Option<f64>],
        start: usize,
        kind: Extremum,
    ) -> Option<(usize, usize)> {
        let points: Vec<usize> = local_extrema(closes, start, self.order, kind)
            .into_iter()
            .filter(|&i| rsi[i].is_some())
            .collect();

        match points.as_slice() {
            [.., first, second] => Some((*first, *second)),
            _ => None,
        }
    }
}

impl Detector for RsiSwingDivergence {
    fn kind(&self) -> DetectorKind {
        DetectorKind::RsiSwingDivergence
    }

    fn detect(
        &self,
        candles: &CandleSeries,
        indicators: &IndicatorSeries,
    ) -> Result<DetectionResult> {
        let rsi = series(indicators, &self.rsi_key)?;
        let closes = candles.closes();
        let start = closes.len().saturating_sub(self.lookback);

        let mut result = DetectionResult::idle(self.kind());

        if let Some((first, second)) = self.last_pair(&closes, rsi, start, Extremum::Minimum) {
            let (rsi_first, rsi_second) =
                (rsi[first].unwrap_or_default(), rsi[second].unwrap_or_default());
            if closes[second] < closes[first] && rsi_second > rsi_first {
                result = DetectionResult::fired(
                    self.kind(),
                    Direction::Bullish,
                    Evidence::Swing { first, second },
                );
            }
        }

        // Bearish is checked last and wins when both hold
        if let Some((first, second)) = self.last_pair(&closes, rsi, start, Extremum::Maximum) {
            let (rsi_first, rsi_second) =
                (rsi[first].unwrap_or_default(), rsi[second].unwrap_or_default());
            if closes[second] > closes[first] && rsi_second < rsi_first {
                result = DetectionResult::fired(
                    self.kind(),
                    Direction::Bearish,
                    Evidence::Swing { first, second },
                );
            }
        }

        Ok(result)
    }
}

/// RSI above/below a midline
#[derive(Debug, Clone)]
pub struct RsiBias {
    rsi_key: String,
    midline: f64,
}

impl RsiBias {
    pub fn new(rsi_period: usize, midline: f64) -> Self {
        Self {
            rsi_key: rsi_key(rsi_period),
            midline,
        }
    }
}

impl Detector for RsiBias {
    fn kind(&self) -> DetectorKind {
        DetectorKind::RsiBias
    }

    fn detect(
        &self,
        candles: &CandleSeries,
        indicators: &IndicatorSeries,
    ) -> Result<DetectionResult> {
        let n = candles.len();
        if n == 0 {
            return Err(EngineError::insufficient(&self.rsi_key, 1, 0));
        }

        let rsi = defined(series(indicators, &self.rsi_key)?, n - 1, &self.rsi_key)?;
        let evidence = Evidence::Bias {
            rsi,
            midline: self.midline,
        };

        Ok(if rsi > self.midline {
            DetectionResult::fired(self.kind(), Direction::Bullish, evidence)
        } else if rsi < self.midline {
            DetectionResult::fired(self.kind(), Direction::Bearish, evidence)
        } else {
            DetectionResult::quiet(self.kind(), evidence)
        })
    }
}

/// The detectors one rule set needs, run together each cycle
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorSet {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Build the detectors named in `kinds`, in that order
    pub fn for_kinds(
        kinds: &[DetectorKind],
        indicators: &IndicatorSettings,
        settings: &DetectorSettings,
    ) -> Self {
        let detectors = kinds
            .iter()
            .map(|kind| -> Box<dyn Detector> {
                match kind {
                    DetectorKind::EmaCrossover => {
                        Box::new(EmaCrossover::new(indicators.ema_period))
                    }
                    DetectorKind::PivotProximity => {
                        Box::new(PivotProximity::new(settings.pivot_tolerance))
                    }
                    DetectorKind::RsiRangeDivergence => Box::new(RsiRangeDivergence::new(
                        indicators.rsi_period,
                        settings.range_lookback,
                    )),
                    DetectorKind::RsiSwingDivergence => Box::new(RsiSwingDivergence::new(
                        indicators.rsi_period,
                        settings.divergence_lookback,
                        settings.swing_order,
                    )),
                    DetectorKind::RsiBias => {
                        Box::new(RsiBias::new(indicators.rsi_period, settings.rsi_midline))
                    }
                }
            })
            .collect();

        Self::new(detectors)
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Run every detector; structural failures become "did not fire"
    pub fn run(
        &self,
        candles: &CandleSeries,
        indicators: &IndicatorSeries,
    ) -> Vec<DetectionResult> {
        self.detectors
            .iter()
            .map(|detector| match detector.detect(candles, indicators) {
                Ok(result) => result,
                Err(e) => {
                    debug!("{} did not evaluate: {}", detector.kind(), e);
                    DetectionResult::idle(detector.kind())
                }
            })
            .collect()
    }
}
