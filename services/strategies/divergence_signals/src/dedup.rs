//! Dedup state machine
//!
//! Guarantees a signal is reported at most once per closed candle, and that
//! the first candle seen after startup only establishes a baseline.

use crate::signals::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing processed since startup
    Idle,
    /// open_time of the last processed candle
    Synced(i64),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    pub last_processed_candle_time: Option<i64>,
    pub last_emitted_signal: Option<Signal>,
}

/// What the engine should do with the latest candle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDecision {
    /// First candle after startup; recorded without evaluation
    Baseline,
    /// Not newer than the last processed candle
    Unchanged { last_processed: i64 },
    /// A new closed candle
    Evaluate,
}

#[derive(Debug, Default)]
pub struct DedupStateMachine {
    state: EngineState,
}

impl DedupStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync_state(&self) -> SyncState {
        match self.state.last_processed_candle_time {
            Some(t) => SyncState::Synced(t),
            None => SyncState::Idle,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Classify the latest candle time. A baseline is recorded immediately.
    pub fn observe(&mut self, candle_time: i64) -> CycleDecision {
        match self.sync_state() {
            SyncState::Idle => {
                self.state.last_processed_candle_time = Some(candle_time);
                CycleDecision::Baseline
            }
            SyncState::Synced(previous) if candle_time <= previous => CycleDecision::Unchanged {
                last_processed: previous,
            },
            SyncState::Synced(_) => CycleDecision::Evaluate,
        }
    }

    /// Record the evaluated candle; returns true when `signal` should be emitted
    pub fn commit(&mut self, candle_time: i64, signal: &Signal) -> bool {
        let emit = signal.is_actionable()
            && match &self.state.last_emitted_signal {
                None => true,
                Some(previous) => previous.kind != signal.kind || previous.at_time != candle_time,
            };

        if emit {
            self.state.last_emitted_signal = Some(signal.clone());
        }
        self.state.last_processed_candle_time = Some(candle_time);

        emit
    }
}
