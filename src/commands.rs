//! Operator control commands
//!
//! Chat text is parsed into a [`ControlCommand`], applied by the
//! [`CommandHandler`] against the live components, and the reply text is
//! published back through the notification channel.

use crate::discovery::DiscoveryEngine;
use crate::engine::CopyEngine;
use crate::ledger::Ledger;
use crate::listener::{StreamListener, WatchRegistry};
use crate::models::{AccountCategory, Trade, TradeState};
use crate::notifications::{NotificationEvent, NotificationSender};
use crate::runtime_config::{validate_targets, RuntimeConfigStore, RuntimeConfigUpdate};
use crate::utils::short_address;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Positions and wallets listed per reply
const LIST_LIMIT: usize = 20;

const HELP_TEXT: &str = "Commands:
/start, /stop - listener and discovery
/size <sol>, /tp <pct>, /sl <pct> - trade parameters
/range <min> <max> - discovery transfer range (SOL)
/discovery on|off, /autocopy on|off
/confirm <addr>, /ignore <addr> - discovered wallets
/follow <addr>, /unfollow <addr>
/execute <id>, /targets <id> <tp> <sl>, /close <id>
/stats, /positions, /wallets, /last, /config, /candidates";

/// A parsed operator command
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start,
    Stop,
    SetTradeSize(f64),
    SetTakeProfit(f64),
    SetStopLoss(f64),
    SetTransferRange { min: f64, max: f64 },
    SetDiscovery(bool),
    SetAutoCopy(bool),
    ConfirmCandidate(String),
    IgnoreCandidate(String),
    Follow(String),
    Unfollow(String),
    Execute(String),
    SetTargets { trade_id: String, tp: f64, sl: f64 },
    Close(String),
    Stats,
    Positions,
    Wallets,
    LastTrade,
    ShowConfig,
    Candidates,
    Help,
}

/// Why a message could not be parsed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandParseError {
    #[error("Not a command")]
    NotACommand,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl FromStr for ControlCommand {
    type Err = CommandParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.split_whitespace();
        let head = parts.next().ok_or(CommandParseError::NotACommand)?;
        let name = head
            .strip_prefix('/')
            .ok_or(CommandParseError::NotACommand)?;
        // Group chats append the bot name: /stats@my_bot
        let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        let command = match name.as_str() {
            "start" => ControlCommand::Start,
            "stop" => ControlCommand::Stop,
            "size" => ControlCommand::SetTradeSize(number(one(&args, "/size <sol>")?)?),
            "tp" => ControlCommand::SetTakeProfit(number(one(&args, "/tp <pct>")?)?),
            "sl" => ControlCommand::SetStopLoss(number(one(&args, "/sl <pct>")?)?),
            "range" => match args.as_slice() {
                [min, max] => ControlCommand::SetTransferRange {
                    min: number(min)?,
                    max: number(max)?,
                },
                _ => return Err(CommandParseError::Usage("/range <min> <max>")),
            },
            "discovery" => ControlCommand::SetDiscovery(switch(&args, "/discovery on|off")?),
            "autocopy" => ControlCommand::SetAutoCopy(switch(&args, "/autocopy on|off")?),
            "confirm" => ControlCommand::ConfirmCandidate(address(one(&args, "/confirm <addr>")?)?),
            "ignore" => ControlCommand::IgnoreCandidate(address(one(&args, "/ignore <addr>")?)?),
            "follow" => ControlCommand::Follow(address(one(&args, "/follow <addr>")?)?),
            "unfollow" => ControlCommand::Unfollow(address(one(&args, "/unfollow <addr>")?)?),
            "execute" => ControlCommand::Execute(one(&args, "/execute <trade_id>")?.to_string()),
            "targets" => match args.as_slice() {
                [id, tp, sl] => ControlCommand::SetTargets {
                    trade_id: id.to_string(),
                    tp: number(tp)?,
                    sl: number(sl)?,
                },
                _ => return Err(CommandParseError::Usage("/targets <trade_id> <tp> <sl>")),
            },
            "close" => ControlCommand::Close(one(&args, "/close <trade_id>")?.to_string()),
            "stats" | "pnl" => ControlCommand::Stats,
            "positions" => ControlCommand::Positions,
            "wallets" => ControlCommand::Wallets,
            "last" => ControlCommand::LastTrade,
            "config" => ControlCommand::ShowConfig,
            "candidates" => ControlCommand::Candidates,
            "help" => ControlCommand::Help,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn one<'a>(args: &[&'a str], usage: &'static str) -> Result<&'a str, CommandParseError> {
    match args {
        [value] => Ok(value),
        _ => Err(CommandParseError::Usage(usage)),
    }
}

fn number(raw: &str) -> Result<f64, CommandParseError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandParseError::InvalidNumber(raw.to_string()))
}

fn switch(args: &[&str], usage: &'static str) -> Result<bool, CommandParseError> {
    match one(args, usage)?.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(CommandParseError::Usage(usage)),
    }
}

fn address(raw: &str) -> Result<String, CommandParseError> {
    Pubkey::from_str(raw)
        .map(|_| raw.to_string())
        .map_err(|_| CommandParseError::InvalidAddress(raw.to_string()))
}

/// Applies commands to the running components
pub struct CommandHandler {
    runtime: Arc<RuntimeConfigStore>,
    ledger: Arc<Ledger>,
    listener: Arc<StreamListener>,
    discovery: Arc<DiscoveryEngine>,
    copy: Arc<CopyEngine>,
}

impl CommandHandler {
    pub fn new(
        runtime: Arc<RuntimeConfigStore>,
        ledger: Arc<Ledger>,
        listener: Arc<StreamListener>,
        discovery: Arc<DiscoveryEngine>,
        copy: Arc<CopyEngine>,
    ) -> Self {
        Self {
            runtime,
            ledger,
            listener,
            discovery,
            copy,
        }
    }

    /// Apply a command and return the reply text
    pub async fn handle(&self, command: ControlCommand) -> String {
        tracing::info!(?command, "Handling command");

        match command {
            ControlCommand::Start => {
                let started = self.listener.start();
                if self.runtime.snapshot().discovery_enabled {
                    self.discovery.start();
                }
                if started {
                    "✅ Listener started".to_string()
                } else {
                    "Listener already running".to_string()
                }
            }
            ControlCommand::Stop => {
                self.listener.stop();
                self.discovery.stop();
                "⏸ Listener and discovery stopped".to_string()
            }
            ControlCommand::SetTradeSize(size) => self.update(
                RuntimeConfigUpdate {
                    trade_size: Some(size),
                    ..Default::default()
                },
                format!("✅ Trade size set to {} SOL", size),
            ),
            ControlCommand::SetTakeProfit(tp) => self.update(
                RuntimeConfigUpdate {
                    tp_percent: Some(tp),
                    ..Default::default()
                },
                format!("✅ Take profit set to +{}%", tp),
            ),
            ControlCommand::SetStopLoss(sl) => self.update(
                RuntimeConfigUpdate {
                    sl_percent: Some(sl),
                    ..Default::default()
                },
                format!("✅ Stop loss set to -{}%", sl),
            ),
            ControlCommand::SetTransferRange { min, max } => self.update(
                RuntimeConfigUpdate {
                    min_transfer: Some(min),
                    max_transfer: Some(max),
                    ..Default::default()
                },
                format!("✅ Discovery range set to {}-{} SOL", min, max),
            ),
            ControlCommand::SetDiscovery(enabled) => {
                let reply = self.update(
                    RuntimeConfigUpdate {
                        discovery_enabled: Some(enabled),
                        ..Default::default()
                    },
                    format!("✅ Discovery {}", if enabled { "enabled" } else { "disabled" }),
                );
                if enabled && self.listener.is_running() {
                    self.discovery.start();
                } else if !enabled {
                    self.discovery.stop();
                }
                reply
            }
            ControlCommand::SetAutoCopy(enabled) => self.update(
                RuntimeConfigUpdate {
                    auto_copy: Some(enabled),
                    ..Default::default()
                },
                format!("✅ Auto-copy {}", if enabled { "enabled" } else { "disabled" }),
            ),
            ControlCommand::ConfirmCandidate(address) => {
                if self.discovery.add_discovered_wallet(&address) {
                    format!("✅ Wallet added: {}", address)
                } else {
                    format!("No pending candidate {}", address)
                }
            }
            ControlCommand::IgnoreCandidate(address) => {
                if self.discovery.ignore_candidate(&address) {
                    format!("❌ Candidate ignored: {}", address)
                } else {
                    format!("No candidate {}", address)
                }
            }
            ControlCommand::Follow(address) => {
                if self.ledger.add_account(&address, AccountCategory::Followed) {
                    self.listener.add_wallet(&address);
                    format!("➕ Following {}", address)
                } else {
                    format!("Already following {}", address)
                }
            }
            ControlCommand::Unfollow(address) => {
                if self.ledger.deactivate_account(&address) {
                    self.listener.remove_wallet(&address);
                    format!("➖ Unfollowed {}", address)
                } else {
                    format!("Cannot unfollow {}", address)
                }
            }
            ControlCommand::Execute(trade_id) => match self.ledger.get_trade(&trade_id) {
                None => format!("Trade {} not found", trade_id),
                Some(trade) if trade.state != TradeState::Pending => {
                    format!("Trade {} is {}", trade_id, trade.state)
                }
                Some(_) => {
                    if self.copy.execute_trade(&trade_id).await {
                        format!("✅ Trade {} executed", trade_id)
                    } else {
                        format!("❌ Trade {} not executed, still PENDING", trade_id)
                    }
                }
            },
            ControlCommand::SetTargets { trade_id, tp, sl } => {
                if let Err(e) = validate_targets(tp, sl) {
                    return format!("❌ {}", e);
                }
                match self.ledger.set_trade_targets(&trade_id, tp, sl) {
                    Ok(trade) => format!(
                        "✅ Trade {} targets: TP +{}% | SL -{}%",
                        trade.id, trade.tp_percent, trade.sl_percent
                    ),
                    Err(e) => format!("❌ {}", e),
                }
            }
            ControlCommand::Close(trade_id) => match self.copy.close_trade_manually(&trade_id).await {
                Ok(trade) => format!(
                    "✅ Trade {} closed: {:+.4} SOL",
                    trade.id,
                    trade.pnl_native.unwrap_or_default()
                ),
                Err(e) => format!("❌ {}", e),
            },
            ControlCommand::Stats => self.stats_text(),
            ControlCommand::Positions => self.positions_text(),
            ControlCommand::Wallets => self.wallets_text(),
            ControlCommand::LastTrade => match self.ledger.last_trade() {
                Some(trade) => trade_line(&trade),
                None => "No trades yet".to_string(),
            },
            ControlCommand::ShowConfig => self.config_text(),
            ControlCommand::Candidates => self.candidates_text(),
            ControlCommand::Help => HELP_TEXT.to_string(),
        }
    }

    fn update(&self, update: RuntimeConfigUpdate, success: String) -> String {
        match self.runtime.update(update) {
            Ok(_) => success,
            Err(e) => format!("❌ {}", e),
        }
    }

    fn stats_text(&self) -> String {
        let stats = self.ledger.stats();
        let discovery = self.discovery.stats();
        format!(
            "📊 Stats\nListener: {} ({} subscriptions)\nActive: {} | Pending: {} | Closed: {}\nWin rate: {:.1}% | PnL: {:+.4} SOL\nCandidates: {} ({} added, {} pending)",
            self.listener.state(),
            self.listener.subscription_count(),
            stats.active_positions,
            stats.pending_trades,
            stats.closed_trades,
            stats.win_rate_percent,
            stats.total_pnl_native,
            discovery.total,
            discovery.added,
            discovery.pending
        )
    }

    fn positions_text(&self) -> String {
        let active = self.ledger.active_trades();
        if active.is_empty() {
            return "No active positions".to_string();
        }
        let mut lines = vec![format!("📈 Active positions ({})", active.len())];
        lines.extend(active.iter().take(LIST_LIMIT).map(trade_line));
        lines.join("\n")
    }

    fn wallets_text(&self) -> String {
        let accounts = self.ledger.accounts();
        let mut lines = vec![format!("👛 Wallets ({})", accounts.len())];
        lines.extend(accounts.iter().take(LIST_LIMIT).map(|account| {
            format!(
                "{} {} [{}]",
                if account.active { "🟢" } else { "⚪" },
                account.address,
                account.category
            )
        }));
        lines.join("\n")
    }

    fn config_text(&self) -> String {
        let config = self.runtime.snapshot();
        format!(
            "⚙️ Config\nMode: {}\nMaster: {}\nTrade size: {} SOL\nTP: +{}% | SL: -{}%\nAuto-copy: {}\nDiscovery: {} ({}-{} SOL)",
            self.copy.mode(),
            short_address(self.ledger.master()),
            config.trade_size,
            config.tp_percent,
            config.sl_percent,
            on_off(config.auto_copy),
            on_off(config.discovery_enabled),
            config.min_transfer,
            config.max_transfer
        )
    }

    fn candidates_text(&self) -> String {
        let candidates: Vec<_> = self
            .discovery
            .candidates()
            .into_iter()
            .filter(|c| !c.ignored && !self.ledger.is_followed(&c.address))
            .collect();
        if candidates.is_empty() {
            return "No pending candidates".to_string();
        }
        let mut lines = vec![format!("🔍 Candidates ({})", candidates.len())];
        lines.extend(candidates.iter().take(LIST_LIMIT).map(|c| {
            let flag = match &c.analysis {
                Some(analysis) if analysis.suspicious => " ⚠️",
                _ => "",
            };
            format!(
                "{} {:.4} SOL from {}{}",
                c.address,
                c.transfer_amount,
                short_address(&c.from_account),
                flag
            )
        }));
        lines.join("\n")
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn trade_line(trade: &Trade) -> String {
    let price = match (trade.state, trade.entry_price, trade.exit_price) {
        (TradeState::Closed, Some(entry), Some(exit)) => format!(
            " {:.9} -> {:.9} ({:+.2}%)",
            entry,
            exit,
            trade.pnl_percent.unwrap_or_default()
        ),
        (_, Some(entry), _) => format!(" @ {:.9}", entry),
        _ => String::new(),
    };
    format!(
        "{} {} {} {} SOL [{}]{}",
        trade.id,
        trade.direction,
        short_address(trade.asset_label()),
        trade.size_native,
        trade.state,
        price
    )
}

/// Parse incoming chat text and publish each reply until cancelled
pub fn spawn_command_loop(
    handler: Arc<CommandHandler>,
    mut commands: mpsc::Receiver<String>,
    notifier: NotificationSender,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                _ = cancel.cancelled() => break,
                text = commands.recv() => match text {
                    Some(text) => text,
                    None => break,
                },
            };

            let reply = match text.parse::<ControlCommand>() {
                Ok(command) => handler.handle(command).await,
                Err(CommandParseError::NotACommand) => continue,
                Err(e) => format!("{}\n\n{}", e, HELP_TEXT),
            };
            if cancel.is_cancelled() {
                break;
            }
            notifier.send(NotificationEvent::CommandReply { text: reply });
        }
        tracing::info!("Command loop stopped");
    })
}
