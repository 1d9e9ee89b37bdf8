//! # Divergence Signals Strategy - Closed-Candle Signal Detection
//!
//! ## Purpose
//!
//! Polls recent OHLCV candles for one instrument, derives EMA/RSI/pivot
//! series, runs a set of pattern detectors against the most recently closed
//! candle and reports at most one typed signal per candle. Signals are
//! delivered to a notifier (log or Telegram) and appended to a JSONL journal.
//!
//! ## Integration Points
//!
//! - **Input Sources**: Binance spot klines over REST (`MarketDataSource`)
//! - **Output Destinations**: `Notifier` implementations, `SignalJournal`
//! - **Operator Surface**: `/status` and `/ping` chat commands answered from
//!   a read-only health view
//! - **Configuration**: one TOML file plus environment overrides
//!
//! ## Architecture Role
//!
//! ```text
//! MarketDataSource → [Indicators] → [Detectors] → [Evaluator] → [Dedup] → Notifier
//!        ↓                ↓              ↓              ↓            ↓         ↓
//!  Closed candles    ema / rsi /   crossover,      first rule   once per   chat or log,
//!  oldest first      pivot series  proximity,      in order     candle     JSONL journal
//!                                  divergence
//! ```
//!
//! Each cycle is pure apart from the fetch and the delivery: `SignalEngine`
//! takes a `CandleSeries` and returns a `CycleOutcome`, the driver in
//! `strategy` does the I/O and the sleeping through an injectable `Clock`.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use divergence_signals::{CandleSeries, EngineConfig, SignalEngine};
//!
//! let config = EngineConfig::default();
//! let mut engine = SignalEngine::new(&config);
//! let window = CandleSeries::new(Vec::new()).unwrap();
//! let outcome = engine.process(&window);
//! if let Some(signal) = outcome.emitted_signal() {
//!     println!("{} @ {}", signal.kind, signal.price);
//! }
//! ```

pub mod candle;
pub mod clock;
pub mod commands;
pub mod config;
pub mod dedup;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod indicators;
pub mod journal;
pub mod logging;
pub mod market_data;
pub mod notifier;
pub mod signals;
pub mod strategy;
pub mod telegram;
pub mod testing;

pub use candle::{Candle, CandleSeries};
pub use clock::{Clock, SystemClock};
pub use config::{DivergenceMethod, EngineConfig, StrategyVariant};
pub use dedup::{DedupStateMachine, EngineState};
pub use detectors::{DetectionResult, Detector, DetectorKind, Direction};
pub use engine::{CycleOutcome, SignalEngine};
pub use error::{DataSourceError, EngineError, JournalError, NotifierError, Result};
pub use evaluator::SignalEvaluator;
pub use journal::{JsonlJournal, NullJournal, SignalJournal};
pub use market_data::{BinanceKlineSource, MarketDataSource};
pub use notifier::{LogNotifier, Notifier, TelegramNotifier};
pub use signals::{Signal, SignalKind, SignalRecord};
pub use strategy::DivergenceSignalStrategy;
