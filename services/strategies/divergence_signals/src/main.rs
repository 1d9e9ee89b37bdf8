//! Divergence Signals Strategy Main Entry Point

use anyhow::{Context, Result};
use divergence_signals::commands::{CommandListener, HealthView, TelegramCommandSource};
use divergence_signals::logging::init_logging;
use divergence_signals::telegram::TelegramClient;
use divergence_signals::{
    log_error, log_network, BinanceKlineSource, Clock, DivergenceSignalStrategy, EngineConfig,
    JsonlJournal, LogNotifier, Notifier, NullJournal, SignalJournal, SystemClock, TelegramNotifier,
};
use signal_strategy_shared::{
    load_config_file, resolve_config_path, ConfigSource, MetricsCollector, Strategy,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_source) =
        load_config().context("Failed to load divergence signals configuration")?;

    let level = config.service.log_level.as_deref().unwrap_or("info");
    init_logging(level)?;
    info!("Configuration source: {}", config_source);

    config
        .validate()
        .context("Invalid divergence signals configuration")?;

    if !config.service.enabled {
        info!("{} is disabled in configuration, exiting", config.service.name);
        return Ok(());
    }

    info!(
        "Configuration loaded: {} {} ({:?}, {:?} divergence)",
        config.symbol, config.timeframe, config.strategy, config.divergence
    );

    let config = Arc::new(config);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(MetricsCollector::new());

    let source = Arc::new(
        BinanceKlineSource::new(&config.market_data, Arc::clone(&clock))
            .context("Failed to build market data client")?,
    );
    log_network!("Polling {} klines", config.market_data.base_url);

    let telegram = match &config.telegram {
        Some(settings) => Some((
            Arc::new(TelegramClient::new(settings).context("Failed to build Telegram client")?),
            settings.command_poll_timeout_secs,
        )),
        None => None,
    };

    let notifier: Arc<dyn Notifier> = match &telegram {
        Some((client, _)) => Arc::new(TelegramNotifier::new(
            Arc::clone(client),
            config.symbol.clone(),
            config.timeframe.clone(),
        )),
        None => Arc::new(LogNotifier::new(config.symbol.clone(), config.timeframe.clone())),
    };

    let journal: Arc<dyn SignalJournal> = match &config.journal_path {
        Some(path) => Arc::new(JsonlJournal::new(path.clone())),
        None => Arc::new(NullJournal),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut strategy = DivergenceSignalStrategy::new(
        Arc::clone(&config),
        source,
        notifier,
        journal,
        Arc::clone(&clock),
    )
    .with_metrics(Arc::clone(&metrics));

    let strategy_rx = shutdown_rx.clone();
    let strategy_handle = tokio::spawn(async move {
        if let Err(e) = strategy.run(strategy_rx).await {
            log_error!("Strategy failed: {:?}", e);
        }
    });

    let listener_handle = telegram.map(|(client, poll_timeout)| {
        let health = HealthView::new(
            Arc::clone(&metrics),
            Arc::clone(&clock),
            config.symbol.clone(),
            config.timeframe.clone(),
            config.poll_interval() * 3 + config.max_backoff(),
        );
        let listener = CommandListener::new(
            TelegramCommandSource::new(client, poll_timeout),
            health,
            config.retry_backoff(),
        );
        tokio::spawn(listener.run(shutdown_rx.clone()))
    });

    info!("{} running. Press Ctrl+C to stop.", config.service.name);

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down {}", config.service.name);
    let _ = shutdown_tx.send(true);

    strategy_handle.await.context("Strategy task panicked")?;
    if let Some(handle) = listener_handle {
        handle.await.context("Command listener task panicked")?;
    }

    Ok(())
}

fn load_config() -> Result<(EngineConfig, ConfigSource)> {
    let config_path = resolve_config_path(
        "SIGNAL_ENGINE_CONFIG_PATH",
        "configs/divergence_signals.toml",
    );

    let (config, source) = load_config_file(&config_path, EngineConfig::default())?;
    Ok((config.with_env_overrides(), source))
}
