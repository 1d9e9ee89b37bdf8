//! Trading signal definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Long,
    Short,
    BullishDivergence,
    BearishDivergence,
    /// Explicit "nothing to report"
    None,
}

impl SignalKind {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalKind::None)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SignalKind::Long => "LONG",
            SignalKind::Short => "SHORT",
            SignalKind::BullishDivergence => "BULLISH DIVERGENCE",
            SignalKind::BearishDivergence => "BEARISH DIVERGENCE",
            SignalKind::None => "NONE",
        };
        f.write_str(label)
    }
}

/// Outcome of one evaluation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,

    /// open_time of the candle that produced the signal
    pub at_time: i64,

    /// Close of that candle
    pub price: f64,

    /// Last value of every indicator series, keyed by series name
    pub supporting_indicators: BTreeMap<String, f64>,
}

impl Signal {
    pub fn none(at_time: i64, price: f64) -> Self {
        Self {
            kind: SignalKind::None,
            at_time,
            price,
            supporting_indicators: BTreeMap::new(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.kind.is_actionable()
    }

    pub fn at_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.at_time)
    }
}

/// Flat record handed to the append-only signal journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: i64,
    pub symbol: String,
    pub timeframe: String,
    pub kind: SignalKind,
    pub price: f64,
    pub indicators: BTreeMap<String, f64>,
}

impl SignalRecord {
    pub fn from_signal(signal: &Signal, symbol: &str, timeframe: &str) -> Self {
        Self {
            timestamp: signal.at_time,
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            kind: signal.kind,
            price: signal.price,
            indicators: signal.supporting_indicators.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_signal_is_not_actionable() {
        let signal = Signal::none(1_700_000_000_000, 42_000.0);
        assert!(!signal.is_actionable());
        assert!(SignalKind::BearishDivergence.is_actionable());
    }

    #[test]
    fn test_record_copies_signal_fields() {
        let mut signal = Signal::none(1_700_000_000_000, 42_000.0);
        signal.kind = SignalKind::Short;
        signal
            .supporting_indicators
            .insert("rsi14".to_string(), 71.5);

        let record = SignalRecord::from_signal(&signal, "BTC/USDT", "5m");
        assert_eq!(record.timestamp, 1_700_000_000_000);
        assert_eq!(record.kind, SignalKind::Short);
        assert_eq!(record.indicators.get("rsi14"), Some(&71.5));

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"short\""));
    }

    #[test]
    fn test_at_time_utc() {
        let signal = Signal::none(0, 1.0);
        assert_eq!(signal.at_time_utc().unwrap().to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }
}
