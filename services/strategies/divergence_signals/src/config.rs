//! Strategy configuration
//!
//! One `EngineConfig` describes one engine instance (one symbol, one
//! timeframe). It is loaded once at startup, validated, wrapped in an `Arc`
//! and handed to every component; nothing reads configuration from globals.

use crate::signals::SignalKind;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use signal_strategy_shared::BaseStrategyConfig;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Service name, enable flag and log level
    pub service: BaseStrategyConfig,

    /// Instrument in exchange-neutral notation, e.g. "BTC/USDT"
    pub symbol: String,

    /// Candle interval as understood by the market data source, e.g. "5m"
    pub timeframe: String,

    /// Number of closed candles requested per cycle
    pub candle_limit: usize,

    /// Delay between successful cycles
    pub poll_interval_secs: u64,

    /// First delay after a failed fetch; doubles per consecutive failure
    pub retry_backoff_secs: u64,

    /// Upper bound for the failure backoff
    pub max_backoff_secs: u64,

    pub indicators: IndicatorSettings,

    pub detectors: DetectorSettings,

    /// Which rule set turns detections into signals
    pub strategy: StrategyVariant,

    /// Which divergence detector the rule set uses
    pub divergence: DivergenceMethod,

    /// Rule precedence override; empty means the variant's default order
    pub precedence: Vec<SignalKind>,

    pub market_data: MarketDataSettings,

    /// Chat delivery and operator commands; log-only when absent
    pub telegram: Option<TelegramSettings>,

    /// Append-only JSONL file for emitted signals
    pub journal_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub ema_period: usize,
    pub rsi_period: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Max relative distance between close and pivot (0.002 = 0.2%)
    pub pivot_tolerance: f64,
    /// Window searched for swing extrema
    pub divergence_lookback: usize,
    /// Neighbours required on each side of a swing extremum
    pub swing_order: usize,
    /// Prior-window length for the range divergence test
    pub range_lookback: usize,
    /// RSI level separating bullish from bearish bias
    pub rsi_midline: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyVariant {
    /// Long/Short on EMA cross + divergence + pivot proximity
    CrossoverDivergencePivot,
    /// Long/Short on EMA cross + RSI midline bias + pivot proximity
    CrossoverBiasPivot,
    /// Labeled divergences only
    DivergenceOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceMethod {
    /// Two most recent local extrema
    Swing,
    /// Last candle against the prior window's max/min
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-poll timeout for inbound operator commands
    #[serde(default = "default_command_poll_timeout")]
    pub command_poll_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_command_poll_timeout() -> u64 {
    25
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service: BaseStrategyConfig {
                name: "divergence_signals".to_string(),
                ..BaseStrategyConfig::default()
            },
            symbol: "BTC/USDT".to_string(),
            timeframe: "5m".to_string(),
            candle_limit: 300,
            poll_interval_secs: 20,
            retry_backoff_secs: 5,
            max_backoff_secs: 120,
            indicators: IndicatorSettings::default(),
            detectors: DetectorSettings::default(),
            strategy: StrategyVariant::CrossoverDivergencePivot,
            divergence: DivergenceMethod::Swing,
            precedence: Vec::new(),
            market_data: MarketDataSettings::default(),
            telegram: None,
            journal_path: None,
        }
    }
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_period: 12,
            rsi_period: 14,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            pivot_tolerance: 0.002, // 0.2%
            divergence_lookback: 40,
            swing_order: 3,
            range_lookback: 14,
            rsi_midline: 50.0,
        }
    }
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Fewest candles for which every configured detector can evaluate
    pub fn min_history(&self) -> usize {
        let divergence_window = match self.divergence {
            DivergenceMethod::Swing => self.detectors.divergence_lookback,
            DivergenceMethod::Range => self.detectors.range_lookback + 1,
        };
        (self.indicators.rsi_period + 1)
            .max(divergence_window)
            .max(3)
    }

    /// Apply environment variable overrides on top of file/default values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(symbol) = std::env::var("SIGNAL_SYMBOL") {
            self.symbol = symbol;
        }

        if let Ok(timeframe) = std::env::var("SIGNAL_TIMEFRAME") {
            self.timeframe = timeframe;
        }

        if let Ok(path) = std::env::var("SIGNAL_JOURNAL_PATH") {
            self.journal_path = Some(PathBuf::from(path));
        }

        if let (Ok(token), Ok(chat_id)) = (
            std::env::var("TELEGRAM_TOKEN"),
            std::env::var("TELEGRAM_CHAT_ID"),
        ) {
            match self.telegram.as_mut() {
                Some(telegram) => {
                    telegram.token = token;
                    telegram.chat_id = chat_id;
                }
                None => {
                    self.telegram = Some(TelegramSettings {
                        token,
                        chat_id,
                        api_base: default_api_base(),
                        command_poll_timeout_secs: default_command_poll_timeout(),
                    });
                }
            }
        }

        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.symbol.trim().is_empty() {
            bail!("symbol must not be empty");
        }

        if self.timeframe.trim().is_empty() {
            bail!("timeframe must not be empty");
        }

        if self.indicators.ema_period == 0 || self.indicators.rsi_period == 0 {
            bail!("indicator periods must be positive");
        }

        if !(self.detectors.pivot_tolerance > 0.0 && self.detectors.pivot_tolerance < 1.0) {
            bail!("pivot_tolerance must be within (0, 1)");
        }

        if self.detectors.swing_order == 0 {
            bail!("swing_order must be positive");
        }

        if self.detectors.divergence_lookback < 4 * self.detectors.swing_order + 2 {
            bail!("divergence_lookback too short to hold two swing extrema");
        }

        if self.detectors.range_lookback == 0 {
            bail!("range_lookback must be positive");
        }

        if !(0.0..=100.0).contains(&self.detectors.rsi_midline) {
            bail!("rsi_midline must be within [0, 100]");
        }

        if self.candle_limit < self.min_history() {
            bail!(
                "candle_limit {} is below the {} candles the detectors need",
                self.candle_limit,
                self.min_history()
            );
        }

        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be positive");
        }

        if self.retry_backoff_secs == 0 || self.max_backoff_secs < self.retry_backoff_secs {
            bail!("backoff must satisfy 0 < retry_backoff_secs <= max_backoff_secs");
        }

        let mut seen = HashSet::new();
        for kind in &self.precedence {
            if *kind == SignalKind::None {
                bail!("precedence must not list the None signal kind");
            }
            if !seen.insert(*kind) {
                bail!("precedence lists {:?} more than once", kind);
            }
        }

        if let Some(telegram) = &self.telegram {
            if telegram.token.is_empty() || telegram.chat_id.is_empty() {
                bail!("telegram token and chat_id must both be set");
            }
        }

        Ok(())
    }
}

impl signal_strategy_shared::StrategyConfig for EngineConfig {
    fn validate(&self) -> anyhow::Result<()> {
        EngineConfig::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_history(), 40);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            symbol = "ETH/USDT"
            strategy = "divergence_only"
            divergence = "range"
            precedence = ["bullish_divergence"]

            [detectors]
            pivot_tolerance = 0.005

            [telegram]
            token = "abc"
            chat_id = "42"
            "#,
        )
        .unwrap();

        assert_eq!(config.symbol, "ETH/USDT");
        assert_eq!(config.timeframe, "5m");
        assert_eq!(config.strategy, StrategyVariant::DivergenceOnly);
        assert_eq!(config.divergence, DivergenceMethod::Range);
        assert_eq!(config.precedence, vec![SignalKind::BullishDivergence]);
        assert_eq!(config.detectors.pivot_tolerance, 0.005);
        assert_eq!(config.detectors.swing_order, 3);
        let telegram = config.telegram.as_ref().unwrap();
        assert_eq!(telegram.api_base, "https://api.telegram.org");
        assert_eq!(telegram.command_poll_timeout_secs, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_periods() {
        let mut config = EngineConfig::default();
        config.indicators.rsi_period = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_candle_limit() {
        let config = EngineConfig {
            candle_limit: 20,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_precedence() {
        let config = EngineConfig {
            precedence: vec![SignalKind::Short, SignalKind::Short],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_tolerance() {
        let mut config = EngineConfig::default();
        config.detectors.pivot_tolerance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config: EngineConfig =
            toml::from_str(include_str!("../../../../configs/divergence_signals.toml")).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.service.name, "divergence_signals");
        assert_eq!(config.strategy, StrategyVariant::CrossoverDivergencePivot);
        assert!(config.telegram.is_none());
        assert_eq!(config.journal_path, Some(PathBuf::from("signals.jsonl")));
    }
}
