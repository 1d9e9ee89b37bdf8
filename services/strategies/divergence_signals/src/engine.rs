//! Per-cycle evaluation core
//!
//! `SignalEngine` is pure with respect to I/O: it is handed a candle window
//! and returns a typed outcome. Fetching, delivery and sleeping live in the
//! strategy driver.

use crate::candle::CandleSeries;
use crate::config::{EngineConfig, IndicatorSettings};
use crate::dedup::{CycleDecision, DedupStateMachine, EngineState};
use crate::detectors::{DetectionResult, DetectorSet};
use crate::evaluator::SignalEvaluator;
use crate::indicators::augment;
use crate::signals::Signal;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The source returned no candles
    NoData,
    /// First candle after startup; recorded, not evaluated
    Baseline { candle_time: i64 },
    /// No candle newer than the last processed one
    Unchanged { candle_time: i64, last_processed: i64 },
    /// A new candle was evaluated
    Evaluated {
        signal: Signal,
        emitted: bool,
        detections: Vec<DetectionResult>,
    },
}

impl CycleOutcome {
    /// The signal to deliver, if this cycle produced one
    pub fn emitted_signal(&self) -> Option<&Signal> {
        match self {
            CycleOutcome::Evaluated {
                signal,
                emitted: true,
                ..
            } => Some(signal),
            _ => None,
        }
    }
}

pub struct SignalEngine {
    indicators: IndicatorSettings,
    detectors: DetectorSet,
    evaluator: SignalEvaluator,
    dedup: DedupStateMachine,
}

impl SignalEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let evaluator = SignalEvaluator::from_config(config);
        let detectors = DetectorSet::for_kinds(
            &evaluator.required_detectors(),
            &config.indicators,
            &config.detectors,
        );

        Self {
            indicators: config.indicators,
            detectors,
            evaluator,
            dedup: DedupStateMachine::new(),
        }
    }

    pub fn state(&self) -> &EngineState {
        self.dedup.state()
    }

    pub fn process(&mut self, series: &CandleSeries) -> CycleOutcome {
        let Some(last) = series.last().copied() else {
            return CycleOutcome::NoData;
        };

        match self.dedup.observe(last.open_time) {
            CycleDecision::Baseline => {
                debug!("baseline candle {}", last.open_time);
                CycleOutcome::Baseline {
                    candle_time: last.open_time,
                }
            }
            CycleDecision::Unchanged { last_processed } => {
                debug!(
                    "no new candle (latest {}, processed {})",
                    last.open_time, last_processed
                );
                CycleOutcome::Unchanged {
                    candle_time: last.open_time,
                    last_processed,
                }
            }
            CycleDecision::Evaluate => {
                let indicators = augment(series, &self.indicators);
                let detections = self.detectors.run(series, &indicators);
                let signal = self.evaluator.evaluate(&detections, &last, &indicators);
                let emitted = self.dedup.commit(last.open_time, &signal);

                debug!(
                    "evaluated candle {}: {} (emitted: {})",
                    last.open_time, signal.kind, emitted
                );

                CycleOutcome::Evaluated {
                    signal,
                    emitted,
                    detections,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalKind;
    use crate::testing::{bullish_reversal_closes, candles_from_closes};
    use proptest::prelude::*;

    const START: i64 = 1_700_000_000_000;
    const STEP: i64 = 300_000;

    #[test]
    fn test_empty_series_is_no_data() {
        let mut engine = SignalEngine::new(&EngineConfig::default());
        let series = CandleSeries::new(Vec::new()).unwrap();
        assert_eq!(engine.process(&series), CycleOutcome::NoData);
    }

    #[test]
    fn test_reversal_emits_long_once() {
        let closes = bullish_reversal_closes();
        let candles = candles_from_closes(START, STEP, &closes);
        let mut engine = SignalEngine::new(&EngineConfig::default());

        let warmup = CandleSeries::new(candles[..candles.len() - 1].to_vec()).unwrap();
        assert!(matches!(engine.process(&warmup), CycleOutcome::Baseline { .. }));

        let full = CandleSeries::new(candles.clone()).unwrap();
        let outcome = engine.process(&full);
        let signal = outcome.emitted_signal().cloned().unwrap();
        assert_eq!(signal.kind, SignalKind::Long);
        assert_eq!(signal.at_time, START + STEP * (closes.len() as i64 - 1));
        assert_eq!(signal.price, closes[closes.len() - 1]);

        assert!(matches!(engine.process(&full), CycleOutcome::Unchanged { .. }));
        assert_eq!(
            engine.state().last_processed_candle_time,
            Some(signal.at_time)
        );
    }

    #[test]
    fn test_short_history_degrades_to_none() {
        let candles = candles_from_closes(START, STEP, &[10.0, 11.0, 12.0, 11.0]);
        let mut engine = SignalEngine::new(&EngineConfig::default());

        engine.process(&CandleSeries::new(candles[..3].to_vec()).unwrap());
        let outcome = engine.process(&CandleSeries::new(candles).unwrap());

        match outcome {
            CycleOutcome::Evaluated {
                signal,
                emitted,
                detections,
            } => {
                assert_eq!(signal.kind, SignalKind::None);
                assert!(!emitted);
                assert_eq!(detections.len(), 3);
                assert!(detections.iter().all(|d| !d.fired));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(engine.state().last_processed_candle_time, Some(START + 3 * STEP));
    }

    proptest! {
        #[test]
        fn reprocessing_a_series_changes_nothing(
            closes in prop::collection::vec(50.0f64..150.0, 2..80),
        ) {
            let candles = candles_from_closes(START, STEP, &closes);
            let warmup = CandleSeries::new(candles[..candles.len() - 1].to_vec()).unwrap();
            let full = CandleSeries::new(candles).unwrap();

            let mut engine = SignalEngine::new(&EngineConfig::default());
            let is_baseline = matches!(engine.process(&warmup), CycleOutcome::Baseline { .. });
            prop_assert!(is_baseline);
            let first = engine.process(&full);
            let is_evaluated = matches!(first, CycleOutcome::Evaluated { .. });
            prop_assert!(is_evaluated);

            let state = engine.state().clone();
            let again = engine.process(&full);
            let is_unchanged = matches!(again, CycleOutcome::Unchanged { .. });
            prop_assert!(is_unchanged);
            prop_assert_eq!(engine.state(), &state);

            let mut fresh = SignalEngine::new(&EngineConfig::default());
            fresh.process(&warmup);
            prop_assert_eq!(fresh.process(&full), first);
        }
    }
}
