//! Operator commands
//!
//! A separate task answers chat commands from a read-only health view. It
//! never touches engine state; everything it reports comes from the shared
//! metrics collector.

use crate::clock::Clock;
use crate::error::NotifierError;
use crate::telegram::TelegramClient;
use async_trait::async_trait;
use signal_strategy_shared::MetricsCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const HELP_TEXT: &str = "Commands: /status, /ping";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Status,
    Ping,
    Unknown(String),
}

impl OperatorCommand {
    /// Parse a chat message; plain text that is not a command yields `None`
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let command = word.strip_prefix('/')?;
        // "/status@my_bot" in group chats
        let command = command.split('@').next().unwrap_or(command);

        Some(match command.to_ascii_lowercase().as_str() {
            "status" => OperatorCommand::Status,
            "ping" => OperatorCommand::Ping,
            other => OperatorCommand::Unknown(other.to_string()),
        })
    }
}

#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Wait (bounded) for new commands
    async fn poll(&mut self) -> Result<Vec<OperatorCommand>, NotifierError>;

    async fn reply(&self, text: &str) -> Result<(), NotifierError>;
}

/// Read-only view of loop liveness
pub struct HealthView {
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
    symbol: String,
    timeframe: String,
    stale_after: Duration,
}

impl HealthView {
    pub fn new(
        metrics: Arc<MetricsCollector>,
        clock: Arc<dyn Clock>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        stale_after: Duration,
    ) -> Self {
        Self {
            metrics,
            clock,
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            stale_after,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.metrics
            .is_alive(self.clock.now_ms(), self.stale_after.as_millis() as i64)
    }

    pub fn status_text(&self) -> String {
        let snapshot = self.metrics.get_metrics();
        let heartbeat = match snapshot.last_heartbeat_ms {
            Some(last) => format!("{}s ago", (self.clock.now_ms() - last).max(0) / 1000),
            None => "never".to_string(),
        };

        format!(
            "{} {} | {}\nLast heartbeat: {}\n\
             Cycles: {} | Candles: {} | Signals: {} | Errors: {}\nUptime: {}s",
            self.symbol,
            self.timeframe,
            if self.is_alive() { "alive" } else { "stalled" },
            heartbeat,
            snapshot.cycles_completed,
            snapshot.candles_processed,
            snapshot.signals_emitted,
            snapshot.errors,
            snapshot.uptime_secs,
        )
    }
}

pub struct CommandListener<S> {
    source: S,
    health: HealthView,
    retry_delay: Duration,
}

impl<S: CommandSource> CommandListener<S> {
    pub fn new(source: S, health: HealthView, retry_delay: Duration) -> Self {
        Self {
            source,
            health,
            retry_delay,
        }
    }

    pub fn response_for(&self, command: &OperatorCommand) -> String {
        match command {
            OperatorCommand::Status => self.health.status_text(),
            OperatorCommand::Ping => "pong".to_string(),
            OperatorCommand::Unknown(name) => format!("Unknown command /{}. {}", name, HELP_TEXT),
        }
    }

    /// Answer commands until shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Command listener started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                polled = self.source.poll() => polled,
                _ = shutdown.changed() => break,
            };

            match polled {
                Ok(commands) => {
                    for command in commands {
                        debug!("operator command {:?}", command);
                        let response = self.response_for(&command);
                        if let Err(e) = self.source.reply(&response).await {
                            warn!("Failed to answer {:?}: {}", command, e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Command poll failed: {}", e);
                    let clock = Arc::clone(&self.health.clock);
                    tokio::select! {
                        _ = clock.sleep(self.retry_delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!("Command listener stopped");
    }
}

/// Commands from one Telegram chat via long polling
pub struct TelegramCommandSource {
    client: Arc<TelegramClient>,
    offset: i64,
    timeout_secs: u64,
}

impl TelegramCommandSource {
    pub fn new(client: Arc<TelegramClient>, timeout_secs: u64) -> Self {
        Self {
            client,
            offset: 0,
            timeout_secs,
        }
    }
}

#[async_trait]
impl CommandSource for TelegramCommandSource {
    async fn poll(&mut self) -> Result<Vec<OperatorCommand>, NotifierError> {
        let updates = self.client.get_updates(self.offset, self.timeout_secs).await?;
        let chat_id = self.client.chat_id();

        let mut commands = Vec::new();
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id.to_string() != chat_id {
                debug!("ignoring message from chat {}", message.chat.id);
                continue;
            }
            if let Some(command) = message.text.as_deref().and_then(OperatorCommand::parse) {
                commands.push(command);
            }
        }

        Ok(commands)
    }

    async fn reply(&self, text: &str) -> Result<(), NotifierError> {
        self.client.send_message(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct QueuedSource {
        batches: VecDeque<Vec<OperatorCommand>>,
        replies: Arc<Mutex<Vec<String>>>,
        shutdown: watch::Sender<bool>,
    }

    #[async_trait]
    impl CommandSource for QueuedSource {
        async fn poll(&mut self) -> Result<Vec<OperatorCommand>, NotifierError> {
            match self.batches.pop_front() {
                Some(batch) => Ok(batch),
                None => {
                    let _ = self.shutdown.send(true);
                    std::future::pending().await
                }
            }
        }

        async fn reply(&self, text: &str) -> Result<(), NotifierError> {
            self.replies.lock().push(text.to_string());
            Ok(())
        }
    }

    fn health(metrics: Arc<MetricsCollector>, clock: Arc<ManualClock>) -> HealthView {
        HealthView::new(metrics, clock, "BTC/USDT", "5m", Duration::from_secs(60))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(OperatorCommand::parse("/status"), Some(OperatorCommand::Status));
        assert_eq!(OperatorCommand::parse("/Status@signal_bot now"), Some(OperatorCommand::Status));
        assert_eq!(OperatorCommand::parse("/ping"), Some(OperatorCommand::Ping));
        assert_eq!(
            OperatorCommand::parse("/stop"),
            Some(OperatorCommand::Unknown("stop".to_string()))
        );
        assert_eq!(OperatorCommand::parse("hello"), None);
        assert_eq!(OperatorCommand::parse("   "), None);
    }

    #[test]
    fn test_status_reports_liveness() {
        let metrics = Arc::new(MetricsCollector::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let view = health(metrics.clone(), clock.clone());

        assert!(!view.is_alive());
        assert!(view.status_text().contains("Last heartbeat: never"));

        metrics.record_heartbeat(990_000);
        metrics.increment_signals();
        assert!(view.is_alive());
        let text = view.status_text();
        assert!(text.contains("alive"));
        assert!(text.contains("10s ago"));
        assert!(text.contains("Signals: 1"));

        clock.set_now_ms(1_100_000);
        assert!(!view.is_alive());
        assert!(view.status_text().contains("stalled"));
    }

    #[tokio::test]
    async fn test_listener_answers_until_shutdown() {
        let (tx, rx) = watch::channel(false);
        let replies = Arc::new(Mutex::new(Vec::new()));
        let source = QueuedSource {
            batches: VecDeque::from([
                vec![OperatorCommand::Ping],
                vec![OperatorCommand::Status, OperatorCommand::Unknown("stop".to_string())],
            ]),
            replies: replies.clone(),
            shutdown: tx,
        };

        let clock = Arc::new(ManualClock::new(0));
        let listener = CommandListener::new(
            source,
            health(Arc::new(MetricsCollector::new()), clock),
            Duration::from_secs(5),
        );
        listener.run(rx).await;

        let replies = replies.lock();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], "pong");
        assert!(replies[1].starts_with("BTC/USDT 5m"));
        assert!(replies[2].contains("Unknown command /stop"));
    }
}
