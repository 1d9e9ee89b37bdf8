//! Signal delivery

use crate::error::{EngineError, NotifierError};
use crate::signals::Signal;
use crate::telegram::TelegramClient;
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one emitted signal. Failures are reported, never retried.
    async fn on_signal(&self, signal: &Signal) -> Result<(), NotifierError>;

    /// Observe a failed cycle
    async fn on_cycle_error(&self, error: &EngineError);
}

/// Human readable alert text
pub fn format_signal_message(symbol: &str, timeframe: &str, signal: &Signal) -> String {
    let time = signal
        .at_time_utc()
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| signal.at_time.to_string());

    let mut text = format!(
        "📊 {} | {}\n📈 Signal: {}\n💰 Price: {}\n🕒 Time: {}",
        symbol, timeframe, signal.kind, signal.price, time
    );

    for (name, value) in &signal.supporting_indicators {
        let _ = write!(text, "\n{}: {:.2}", name, value);
    }

    text
}

/// Writes alerts to the log; used when no chat is configured
pub struct LogNotifier {
    symbol: String,
    timeframe: String,
}

impl LogNotifier {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn on_signal(&self, signal: &Signal) -> Result<(), NotifierError> {
        info!("{}", format_signal_message(&self.symbol, &self.timeframe, signal));
        Ok(())
    }

    async fn on_cycle_error(&self, error: &EngineError) {
        warn!("{} {} cycle failed: {}", self.symbol, self.timeframe, error);
    }
}

/// Sends alerts to the configured chat
pub struct TelegramNotifier {
    client: Arc<TelegramClient>,
    symbol: String,
    timeframe: String,
}

impl TelegramNotifier {
    pub fn new(
        client: Arc<TelegramClient>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
    ) -> Self {
        Self {
            client,
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn on_signal(&self, signal: &Signal) -> Result<(), NotifierError> {
        let text = format_signal_message(&self.symbol, &self.timeframe, signal);
        self.client.send_message(&text).await
    }

    async fn on_cycle_error(&self, error: &EngineError) {
        // transient fetch failures are not worth a chat message
        warn!("{} {} cycle failed: {}", self.symbol, self.timeframe, error);
    }
}
