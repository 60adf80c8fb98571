//! Mirror Operator Library
//!
//! Copy-trading assistant for Solana: watches tracked accounts over a
//! websocket log feed, proposes new wallets from their transfers, mirrors
//! their swaps and closes copied positions on take-profit or stop-loss.
//! This library exposes core modules for the binary and for tests.

pub mod commands;
pub mod config;
pub mod constants;
pub mod db;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod listener;
pub mod models;
pub mod notifications;
pub mod price_oracle;
pub mod runtime_config;
pub mod utils;

// Re-export commonly used types for tests
pub use commands::{CommandHandler, ControlCommand};
pub use config::{AppConfig, StateBackend};
pub use discovery::{DiscoveryEngine, DiscoveryOutcome};
pub use engine::{CopyEngine, EventRouter, ExitMonitor, SwapExecutor};
pub use error::{AppError, AppResult};
pub use ledger::{Ledger, LedgerSnapshot, StateStore};
pub use listener::{StreamListener, WatchRegistry};
pub use models::{ClassifiedEvent, ExitReason, Trade, TradeDirection, TradeMode, TradeState};
pub use notifications::{CompositeNotifier, NotificationEvent, NotificationSender};
pub use price_oracle::PriceOracle;
pub use runtime_config::{RuntimeConfig, RuntimeConfigStore};
