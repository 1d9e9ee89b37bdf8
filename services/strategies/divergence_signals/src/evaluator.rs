//! Signal evaluator
//!
//! Turns one cycle's detection results into exactly one `Signal`. Rules are
//! plain data checked in precedence order; the first satisfied rule wins.

use crate::candle::Candle;
use crate::config::{DivergenceMethod, EngineConfig, StrategyVariant};
use crate::detectors::{DetectionResult, DetectorKind, Direction};
use crate::indicators::IndicatorSeries;
use crate::signals::{Signal, SignalKind};

/// Order used when the configuration gives no explicit precedence
pub const DEFAULT_PRECEDENCE: [SignalKind; 4] = [
    SignalKind::Long,
    SignalKind::Short,
    SignalKind::BearishDivergence,
    SignalKind::BullishDivergence,
];

/// One detector that must have fired, optionally in a given direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub detector: DetectorKind,
    /// `None` accepts any direction
    pub direction: Option<Direction>,
}

impl Requirement {
    pub fn bullish(detector: DetectorKind) -> Self {
        Self {
            detector,
            direction: Some(Direction::Bullish),
        }
    }

    pub fn bearish(detector: DetectorKind) -> Self {
        Self {
            detector,
            direction: Some(Direction::Bearish),
        }
    }

    pub fn any(detector: DetectorKind) -> Self {
        Self {
            detector,
            direction: None,
        }
    }

    fn satisfied_by(&self, results: &[DetectionResult]) -> bool {
        results.iter().any(|result| {
            result.detector == self.detector
                && result.fired
                && self.direction.map_or(true, |d| d == result.direction)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRule {
    pub kind: SignalKind,
    pub all_of: Vec<Requirement>,
}

impl SignalRule {
    pub fn new(kind: SignalKind, all_of: Vec<Requirement>) -> Self {
        Self { kind, all_of }
    }

    pub fn is_satisfied(&self, results: &[DetectionResult]) -> bool {
        !self.all_of.is_empty() && self.all_of.iter().all(|req| req.satisfied_by(results))
    }
}

pub struct SignalEvaluator {
    rules: Vec<SignalRule>,
}

impl SignalEvaluator {
    /// Rules are kept in the given order
    pub fn new(rules: Vec<SignalRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let divergence = match config.divergence {
            DivergenceMethod::Swing => DetectorKind::RsiSwingDivergence,
            DivergenceMethod::Range => DetectorKind::RsiRangeDivergence,
        };

        let rules = match config.strategy {
            StrategyVariant::CrossoverDivergencePivot => vec![
                SignalRule::new(
                    SignalKind::Long,
                    vec![
                        Requirement::bullish(DetectorKind::EmaCrossover),
                        Requirement::bullish(divergence),
                        Requirement::any(DetectorKind::PivotProximity),
                    ],
                ),
                SignalRule::new(
                    SignalKind::Short,
                    vec![
                        Requirement::bearish(DetectorKind::EmaCrossover),
                        Requirement::bearish(divergence),
                        Requirement::any(DetectorKind::PivotProximity),
                    ],
                ),
            ],
            StrategyVariant::CrossoverBiasPivot => vec![
                SignalRule::new(
                    SignalKind::Long,
                    vec![
                        Requirement::bullish(DetectorKind::EmaCrossover),
                        Requirement::bullish(DetectorKind::RsiBias),
                        Requirement::any(DetectorKind::PivotProximity),
                    ],
                ),
                SignalRule::new(
                    SignalKind::Short,
                    vec![
                        Requirement::bearish(DetectorKind::EmaCrossover),
                        Requirement::bearish(DetectorKind::RsiBias),
                        Requirement::any(DetectorKind::PivotProximity),
                    ],
                ),
            ],
            StrategyVariant::DivergenceOnly => vec![
                SignalRule::new(
                    SignalKind::BearishDivergence,
                    vec![Requirement::bearish(divergence)],
                ),
                SignalRule::new(
                    SignalKind::BullishDivergence,
                    vec![Requirement::bullish(divergence)],
                ),
            ],
        };

        Self::new(order_rules(rules, &config.precedence))
    }

    pub fn rules(&self) -> &[SignalRule] {
        &self.rules
    }

    /// Detectors referenced by any rule, in first-use order
    pub fn required_detectors(&self) -> Vec<DetectorKind> {
        let mut kinds = Vec::new();
        for requirement in self.rules.iter().flat_map(|rule| rule.all_of.iter()) {
            if !kinds.contains(&requirement.detector) {
                kinds.push(requirement.detector);
            }
        }
        kinds
    }

    /// Combine detections for `candle` into a single signal
    pub fn evaluate(
        &self,
        results: &[DetectionResult],
        candle: &Candle,
        indicators: &IndicatorSeries,
    ) -> Signal {
        let kind = self
            .rules
            .iter()
            .find(|rule| rule.is_satisfied(results))
            .map_or(SignalKind::None, |rule| rule.kind);

        Signal {
            kind,
            at_time: candle.open_time,
            price: candle.close,
            supporting_indicators: indicators.latest_values(),
        }
    }
}

/// Explicitly listed kinds first, then the rest in default order
fn order_rules(mut rules: Vec<SignalRule>, precedence: &[SignalKind]) -> Vec<SignalRule> {
    let position = |kind: SignalKind| {
        precedence
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_else(|| {
                precedence.len()
                    + DEFAULT_PRECEDENCE
                        .iter()
                        .position(|k| *k == kind)
                        .unwrap_or(DEFAULT_PRECEDENCE.len())
            })
    };

    rules.sort_by_key(|rule| position(rule.kind));
    rules
}
