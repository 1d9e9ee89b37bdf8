//! BTC/USDT 5m scenario driven through the full polling loop with in-memory
//! fakes: warm-up baseline, a failed fetch, one Long, then a quiet repeat.

use divergence_signals::testing::{
    bullish_reversal_closes, candles_from_closes, ManualClock, MemoryJournal, RecordingNotifier,
    ScriptedSource,
};
use divergence_signals::{
    CandleSeries, CycleOutcome, DivergenceSignalStrategy, EngineConfig, JsonlJournal,
    SignalEngine, SignalKind, SignalRecord,
};
use signal_strategy_shared::Strategy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const START: i64 = 1_700_000_000_000;
const FIVE_MINUTES: i64 = 300_000;

fn config() -> EngineConfig {
    EngineConfig {
        symbol: "BTC/USDT".to_string(),
        timeframe: "5m".to_string(),
        ..EngineConfig::default()
    }
}

#[test]
fn engine_reports_single_long_on_reversal() {
    let closes = bullish_reversal_closes();
    let candles = candles_from_closes(START, FIVE_MINUTES, &closes);
    let mut engine = SignalEngine::new(&config());

    let warmup = CandleSeries::new(candles[..299].to_vec()).unwrap();
    assert_eq!(
        engine.process(&warmup),
        CycleOutcome::Baseline {
            candle_time: START + 298 * FIVE_MINUTES
        }
    );

    let window = CandleSeries::new(candles).unwrap();
    let outcome = engine.process(&window);
    let signal = outcome.emitted_signal().cloned().expect("a Long on the reversal candle");
    assert_eq!(signal.kind, SignalKind::Long);
    assert_eq!(signal.at_time, START + 299 * FIVE_MINUTES);
    assert_eq!(signal.price, 93.65);
    assert!(signal.supporting_indicators.contains_key("ema12"));
    assert!(signal.supporting_indicators.contains_key("rsi14"));
    assert!(signal.supporting_indicators.contains_key("pivot"));

    if let CycleOutcome::Evaluated { detections, .. } = &outcome {
        assert_eq!(detections.len(), 3);
        assert!(detections.iter().all(|d| d.fired));
    }

    assert_eq!(
        engine.process(&window),
        CycleOutcome::Unchanged {
            candle_time: START + 299 * FIVE_MINUTES,
            last_processed: START + 299 * FIVE_MINUTES,
        }
    );
}

#[test]
fn engine_is_idempotent_across_instances() {
    let candles = candles_from_closes(START, FIVE_MINUTES, &bullish_reversal_closes());
    let warmup = CandleSeries::new(candles[..299].to_vec()).unwrap();
    let window = CandleSeries::new(candles).unwrap();

    let run = || {
        let mut engine = SignalEngine::new(&config());
        engine.process(&warmup);
        engine.process(&window)
    };

    assert_eq!(run(), run());
}

#[tokio::test]
async fn polling_loop_backs_off_and_emits_once() {
    let candles = candles_from_closes(START, FIVE_MINUTES, &bullish_reversal_closes());
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(candles[..299].to_vec()),
        Err("HTTP 502".to_string()),
        Ok(candles.clone()),
        Ok(candles.clone()),
    ]));
    let notifier = Arc::new(RecordingNotifier::new());
    let journal = Arc::new(MemoryJournal::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock = Arc::new(ManualClock::new(START).stop_after(4, shutdown_tx));

    let mut strategy = DivergenceSignalStrategy::new(
        Arc::new(config()),
        source.clone(),
        notifier.clone(),
        journal.clone(),
        clock.clone(),
    );

    tokio::time::timeout(Duration::from_secs(5), strategy.run(shutdown_rx))
        .await
        .expect("loop stops after the scripted sleeps")
        .unwrap();

    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(20),
            Duration::from_secs(5),
            Duration::from_secs(20),
            Duration::from_secs(20),
        ]
    );
    assert_eq!(source.calls(), 4);

    let signals = notifier.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].kind, SignalKind::Long);
    assert_eq!(notifier.cycle_errors().len(), 1);

    let records = journal.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].symbol, "BTC/USDT");
    assert_eq!(records[0].timeframe, "5m");

    let metrics = strategy.metrics();
    assert_eq!(metrics.cycles_completed, 3);
    assert_eq!(metrics.candles_processed, 1);
    assert_eq!(metrics.signals_emitted, 1);
    assert_eq!(metrics.errors, 1);
    assert_eq!(metrics.last_heartbeat_ms, Some(START + 45_000));
}

#[tokio::test]
async fn shutdown_before_start_skips_fetching() {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let mut strategy = DivergenceSignalStrategy::new(
        Arc::new(config()),
        source.clone(),
        Arc::new(RecordingNotifier::new()),
        Arc::new(MemoryJournal::new()),
        Arc::new(ManualClock::new(START)),
    );

    strategy.run(shutdown_rx).await.unwrap();
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn jsonl_journal_receives_emitted_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.jsonl");
    let candles = candles_from_closes(START, FIVE_MINUTES, &bullish_reversal_closes());
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(candles[..299].to_vec()),
        Ok(candles.clone()),
    ]));

    let mut strategy = DivergenceSignalStrategy::new(
        Arc::new(config()),
        source,
        Arc::new(RecordingNotifier::new()),
        Arc::new(JsonlJournal::new(&path)),
        Arc::new(ManualClock::new(START)),
    );

    strategy.run_cycle().await.unwrap();
    strategy.run_cycle().await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let records: Vec<SignalRecord> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, SignalKind::Long);
    assert_eq!(records[0].timestamp, START + 299 * FIVE_MINUTES);
}
