//! Notification service for Mirror Operator
//!
//! Core components push events into a one-way channel; a dispatcher task
//! forwards them to every enabled service:
//! - Trade detected / execution result
//! - Position closed (TP, SL, manual)
//! - Wallet discovered / added
//! - Listener gave up reconnecting
//! - Command replies

pub mod telegram;

pub use telegram::{TelegramCommandSource, TelegramNotifier};

use crate::models::{ExitReason, Trade};
use crate::utils::short_address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Alert level for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Critical alerts (listener gave up)
    Critical,
    /// Important alerts (trade detected, position closed, failed execution)
    Important,
    /// Informational alerts (discoveries, replies)
    Info,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Critical => write!(f, "CRITICAL"),
            AlertLevel::Important => write!(f, "IMPORTANT"),
            AlertLevel::Info => write!(f, "INFO"),
        }
    }
}

/// Notification event types
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// A copied trade was opened as PENDING
    TradeDetected { trade: Trade, auto_copy: bool },
    /// Outcome of an execution attempt
    ExecutionResult {
        trade_id: String,
        asset: String,
        success: bool,
        fill_price: Option<f64>,
        error: Option<String>,
    },
    /// Position closed with realized PnL
    PositionClosed {
        trade_id: String,
        asset: String,
        reason: ExitReason,
        exit_price: f64,
        pnl_native: f64,
        pnl_percent: f64,
    },
    /// New candidate wallet found by discovery
    WalletDiscovered {
        address: String,
        from: String,
        amount_sol: f64,
        balance_sol: f64,
        tx_count: usize,
    },
    /// Wallet added to the watch set
    WalletAdded { address: String },
    /// Listener exhausted its reconnect attempts
    ListenerFailed { attempts: u32 },
    /// Reply to an operator command
    CommandReply { text: String },
    /// Process shutting down
    Shutdown,
}

impl NotificationEvent {
    /// Get the alert level for this event
    pub fn level(&self) -> AlertLevel {
        match self {
            NotificationEvent::ListenerFailed { .. } => AlertLevel::Critical,
            NotificationEvent::TradeDetected { .. } => AlertLevel::Important,
            NotificationEvent::ExecutionResult { success: false, .. } => AlertLevel::Important,
            NotificationEvent::ExecutionResult { .. } => AlertLevel::Info,
            NotificationEvent::PositionClosed { .. } => AlertLevel::Important,
            NotificationEvent::WalletDiscovered { .. } => AlertLevel::Info,
            NotificationEvent::WalletAdded { .. } => AlertLevel::Info,
            NotificationEvent::CommandReply { .. } => AlertLevel::Info,
            NotificationEvent::Shutdown => AlertLevel::Important,
        }
    }

    /// Format the event as a notification message
    pub fn format_message(&self) -> String {
        match self {
            NotificationEvent::TradeDetected { trade, auto_copy } => {
                let follow_up = if *auto_copy {
                    "executing now".to_string()
                } else {
                    format!("/execute {} to copy", trade.id)
                };
                format!(
                    "🎯 {} {} from {}\nSize: {} SOL | TP: {}% | SL: {}% | {}\nTrade {}: {}",
                    trade.direction,
                    short_address(trade.asset_label()),
                    short_address(&trade.source_account),
                    trade.size_native,
                    trade.tp_percent,
                    trade.sl_percent,
                    trade.mode,
                    trade.id,
                    follow_up
                )
            }
            NotificationEvent::ExecutionResult {
                trade_id,
                asset,
                success: true,
                fill_price,
                ..
            } => format!(
                "✅ Executed {} on {} @ {:.9} SOL",
                trade_id,
                short_address(asset),
                fill_price.unwrap_or_default()
            ),
            NotificationEvent::ExecutionResult {
                trade_id,
                asset,
                error,
                ..
            } => format!(
                "❌ Execution failed for {} on {}: {} (trade stays PENDING)",
                trade_id,
                short_address(asset),
                error.as_deref().unwrap_or("unknown error")
            ),
            NotificationEvent::PositionClosed {
                trade_id,
                asset,
                reason,
                exit_price,
                pnl_native,
                pnl_percent,
            } => {
                let emoji = if *pnl_native >= 0.0 { "💰" } else { "📉" };
                format!(
                    "{} {} closed ({}) {}: {:+.2}% ({:+.4} SOL) @ {:.9}",
                    emoji,
                    trade_id,
                    reason,
                    short_address(asset),
                    pnl_percent,
                    pnl_native,
                    exit_price
                )
            }
            NotificationEvent::WalletDiscovered {
                address,
                from,
                amount_sol,
                balance_sol,
                tx_count,
            } => format!(
                "🆕 Wallet discovered: {}\nReceived {:.4} SOL from {}\nBalance: {:.4} SOL | Recent txs: {}\n/confirm {} or /ignore {}",
                address,
                amount_sol,
                short_address(from),
                balance_sol,
                tx_count,
                address,
                address
            ),
            NotificationEvent::WalletAdded { address } => {
                format!("➕ Now following {}", address)
            }
            NotificationEvent::ListenerFailed { attempts } => format!(
                "🚨 Listener stopped after {} reconnect attempts. Send /start to retry.",
                attempts
            ),
            NotificationEvent::CommandReply { text } => text.clone(),
            NotificationEvent::Shutdown => "🛑 Mirror Operator shutting down".to_string(),
        }
    }
}

/// Notification service trait
#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    /// Send a notification
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()>;

    /// Check if the service is enabled
    fn is_enabled(&self) -> bool;
}

/// Composite notifier that can send to multiple services
pub struct CompositeNotifier {
    services: Vec<Arc<dyn NotificationService>>,
}

impl CompositeNotifier {
    /// Create a new composite notifier
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// Add a notification service
    pub fn add_service(&mut self, service: Arc<dyn NotificationService>) {
        self.services.push(service);
    }

    /// Send notification to all enabled services
    pub async fn notify(&self, event: NotificationEvent) {
        for service in &self.services {
            if service.is_enabled() {
                if let Err(e) = service.notify(event.clone()).await {
                    tracing::error!(
                        error = %e,
                        event = ?event.level(),
                        "Failed to send notification"
                    );
                }
            }
        }
    }
}

impl Default for CompositeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes every notification to the log
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationService for LogNotifier {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        let message = event.format_message();
        match event.level() {
            AlertLevel::Critical => tracing::error!(level = "critical", "{}", message),
            AlertLevel::Important => tracing::warn!(level = "important", "{}", message),
            AlertLevel::Info => tracing::info!(level = "info", "{}", message),
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Handle used by core components to publish notifications.
///
/// Sending never blocks and never fails the caller.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl NotificationSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: NotificationEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Notification dispatcher gone, dropping event");
        }
    }
}

/// Forward queued events to the notifier until cancelled.
///
/// On cancellation, events already queued are still delivered.
pub fn spawn_dispatcher(
    mut rx: mpsc::UnboundedReceiver<NotificationEvent>,
    notifier: Arc<CompositeNotifier>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(event) => notifier.notify(event).await,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    while let Ok(event) = rx.try_recv() {
                        notifier.notify(event).await;
                    }
                    break;
                }
            }
        }
        tracing::info!("Notification dispatcher stopped");
    })
}
