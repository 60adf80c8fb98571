//! Mirror Operator - copy-trading assistant for Solana
//!
//! This is the main entry point for the Operator service.
//! It loads configuration, restores the ledger and wires the listener,
//! discovery, copy engine and command surface together.

use mirror_operator::commands::{spawn_command_loop, CommandHandler};
use mirror_operator::config::{AppConfig, StateBackend};
use mirror_operator::db::SqliteStateStore;
use mirror_operator::discovery::{DiscoveryEngine, RpcAccountAnalyzer};
use mirror_operator::engine::{
    CopyEngine, DisabledExecutor, EventRouter, ExitMonitor, PaperExecutor, SwapExecutor,
};
use mirror_operator::ledger::{self, JsonFileStore, Ledger, StateStore};
use mirror_operator::listener::{HeuristicClassifier, ListenerSettings, StreamListener};
use mirror_operator::models::TradeMode;
use mirror_operator::notifications::{
    spawn_dispatcher, CompositeNotifier, LogNotifier, NotificationEvent, NotificationSender,
    TelegramCommandSource, TelegramNotifier,
};
use mirror_operator::price_oracle::{JupiterPriceOracle, PriceOracle};
use mirror_operator::runtime_config::RuntimeConfigStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Queued command messages
const COMMAND_BUFFER: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration errors are fatal before anything starts
    let config = load_config()?;

    init_tracing(config.logging.json);
    tracing::info!("Starting Mirror Operator v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        mode = %config.mode,
        master = %config.wallet.master,
        backend = ?config.state.backend,
        "Configuration loaded"
    );

    // Restore persisted state
    let store: Arc<dyn StateStore> = match config.state.backend {
        StateBackend::Json => Arc::new(JsonFileStore::new(&config.state.path)),
        StateBackend::Sqlite => Arc::new(SqliteStateStore::connect(&config.state.path).await?),
    };
    let ledger = match store.load().await {
        Ok(Some(snapshot)) => Arc::new(Ledger::restore(&config.wallet.master, snapshot)),
        Ok(None) => Arc::new(Ledger::new(&config.wallet.master)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load saved state, starting empty");
            Arc::new(Ledger::new(&config.wallet.master))
        }
    };
    let stats = ledger.stats();
    tracing::info!(
        accounts = ledger.accounts().len(),
        trades = stats.total_trades,
        active = stats.active_positions,
        "Ledger initialized"
    );

    let root = CancellationToken::new();

    // Notifications
    let (notifier, notification_rx) = NotificationSender::channel();
    let mut services = CompositeNotifier::new();
    services.add_service(Arc::new(LogNotifier));
    if config.telegram.enabled {
        match TelegramNotifier::new(&config.telegram) {
            Ok(telegram) => services.add_service(Arc::new(telegram)),
            Err(e) => tracing::warn!(error = %e, "Telegram notifier unavailable"),
        }
    }
    let dispatcher = spawn_dispatcher(notification_rx, Arc::new(services), root.child_token());

    // Core components
    let runtime = Arc::new(RuntimeConfigStore::new(config.runtime.clone()));
    let oracle: Arc<dyn PriceOracle> = Arc::new(JupiterPriceOracle::new(&config.price)?);
    let executor: Arc<dyn SwapExecutor> = match config.mode {
        TradeMode::Test => Arc::new(PaperExecutor::new(oracle.clone())),
        TradeMode::Real => {
            tracing::warn!("REAL mode without a swap backend: trades will stay PENDING");
            Arc::new(DisabledExecutor)
        }
    };

    let (event_tx, event_rx) = mpsc::channel(config.listener.event_buffer);
    let classifier = Arc::new(HeuristicClassifier::new(&config.wallet.master, runtime.clone()));
    let listener = Arc::new(StreamListener::new(
        ListenerSettings::from_config(&config),
        ledger.clone(),
        classifier,
        event_tx,
        notifier.clone(),
    ));

    let analyzer = Arc::new(RpcAccountAnalyzer::new(
        &config.rpc.http_url,
        Duration::from_millis(config.rpc.timeout_ms),
        &config.discovery,
    ));
    let discovery = Arc::new(DiscoveryEngine::new(
        runtime.clone(),
        ledger.clone(),
        analyzer,
        listener.clone(),
        notifier.clone(),
    ));

    let monitor = Arc::new(ExitMonitor::new(
        ledger.clone(),
        oracle.clone(),
        notifier.clone(),
        Duration::from_secs(config.monitor.poll_interval_secs),
    ));
    let copy = Arc::new(CopyEngine::new(
        ledger.clone(),
        runtime.clone(),
        executor,
        oracle,
        monitor,
        notifier.clone(),
        config.mode,
    ));

    // Background tasks
    EventRouter::new(runtime.clone(), discovery.clone(), copy.clone())
        .spawn(event_rx, root.child_token());
    ledger::spawn_persistence_writer(ledger.clone(), store.clone(), root.child_token());
    spawn_housekeeping(&config, ledger.clone(), discovery.clone(), store.clone(), root.child_token());

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let handler = Arc::new(CommandHandler::new(
        runtime.clone(),
        ledger.clone(),
        listener.clone(),
        discovery.clone(),
        copy.clone(),
    ));
    spawn_command_loop(handler, command_rx, notifier.clone(), root.child_token());
    if config.telegram.enabled && config.telegram.poll_commands {
        match TelegramCommandSource::new(&config.telegram) {
            Ok(source) => {
                source.spawn(command_tx, root.child_token());
            }
            Err(e) => tracing::warn!(error = %e, "Telegram command polling unavailable"),
        }
    }

    if config.listener.autostart {
        listener.start();
        if runtime.snapshot().discovery_enabled {
            discovery.start();
        }
    }
    let resumed = copy.resume_monitoring();
    tracing::info!(resumed, "Mirror Operator running");

    wait_for_shutdown().await;
    tracing::info!("Shutdown requested");

    listener.stop();
    discovery.stop();
    let stopped = copy.stop_all_monitoring();
    tracing::info!(stopped, "Exit monitoring stopped, positions remain open");
    ledger::flush(&ledger, store.as_ref()).await;
    notifier.send(NotificationEvent::Shutdown);

    root.cancel();
    if let Err(e) = dispatcher.await {
        tracing::warn!(error = %e, "Notification dispatcher ended abnormally");
    }
    tracing::info!("Mirror Operator stopped");
    Ok(())
}

/// Periodic stats log, candidate eviction and state flush
fn spawn_housekeeping(
    config: &AppConfig,
    ledger: Arc<Ledger>,
    discovery: Arc<DiscoveryEngine>,
    store: Arc<dyn StateStore>,
    cancel: CancellationToken,
) {
    let period = Duration::from_secs(config.housekeeping.interval_secs);
    let retention_hours = config.discovery.retention_hours;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick fires immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let stats = ledger.stats();
                    tracing::info!(
                        active = stats.active_positions,
                        pending = stats.pending_trades,
                        closed = stats.closed_trades,
                        pnl_sol = stats.total_pnl_native,
                        win_rate = stats.win_rate_percent,
                        candidates = discovery.stats().total,
                        "Housekeeping"
                    );
                    discovery.clear_old_discoveries(retention_hours);
                    ledger::flush(&ledger, store.as_ref()).await;
                }
            }
        }
    });
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mirror_operator=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load and validate configuration
fn load_config() -> anyhow::Result<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}
