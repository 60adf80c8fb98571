//! Copy engine: opens ledger trades for detected swaps and executes them

use super::executor::SwapExecutor;
use super::exit_monitor::ExitMonitor;
use crate::error::{AppError, AppResult};
use crate::ledger::Ledger;
use crate::models::{ExitReason, NewTrade, Trade, TradeDirection, TradeMode, TradeState};
use crate::notifications::{NotificationEvent, NotificationSender};
use crate::price_oracle::PriceOracle;
use crate::runtime_config::RuntimeConfigStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A detected swap from a watched account
#[derive(Debug, Clone)]
pub struct DetectedSwap {
    pub direction: TradeDirection,
    pub source_account: String,
    pub asset_id: Option<String>,
    pub signature: String,
}

/// Removes a trade id from the in-flight set when dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}

/// Trade router and executor front
pub struct CopyEngine {
    ledger: Arc<Ledger>,
    runtime: Arc<RuntimeConfigStore>,
    executor: Arc<dyn SwapExecutor>,
    oracle: Arc<dyn PriceOracle>,
    monitor: Arc<ExitMonitor>,
    notifier: NotificationSender,
    mode: TradeMode,
    in_flight: Mutex<HashSet<String>>,
}

impl CopyEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        runtime: Arc<RuntimeConfigStore>,
        executor: Arc<dyn SwapExecutor>,
        oracle: Arc<dyn PriceOracle>,
        monitor: Arc<ExitMonitor>,
        notifier: NotificationSender,
        mode: TradeMode,
    ) -> Self {
        Self {
            ledger,
            runtime,
            executor,
            oracle,
            monitor,
            notifier,
            mode,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn mode(&self) -> TradeMode {
        self.mode
    }

    pub fn monitor(&self) -> &Arc<ExitMonitor> {
        &self.monitor
    }

    /// Open a PENDING trade sized by the operator's own parameters.
    ///
    /// Executes immediately when auto-copy is on. Swaps without a resolved
    /// asset are ignored.
    pub async fn on_swap_event(&self, swap: DetectedSwap) -> Option<Trade> {
        let Some(asset_id) = swap.asset_id else {
            debug!(signature = %swap.signature, "Swap without asset, ignoring");
            return None;
        };

        let config = self.runtime.snapshot();
        let trade = self.ledger.create_trade(NewTrade {
            source_account: swap.source_account,
            asset_id,
            asset_symbol: None,
            direction: swap.direction,
            size_native: config.trade_size,
            tp_percent: config.tp_percent,
            sl_percent: config.sl_percent,
            mode: self.mode,
            source_signature: Some(swap.signature),
        });

        self.notifier.send(NotificationEvent::TradeDetected {
            trade: trade.clone(),
            auto_copy: config.auto_copy,
        });

        if config.auto_copy {
            self.execute_trade(&trade.id).await;
        }
        self.ledger.get_trade(&trade.id).or(Some(trade))
    }

    /// Execute a PENDING trade. Never fails; returns whether it filled.
    pub async fn execute_trade(&self, trade_id: &str) -> bool {
        if !self.in_flight.lock().insert(trade_id.to_string()) {
            debug!(trade_id = %trade_id, "Execution already in flight");
            return false;
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            id: trade_id.to_string(),
        };

        // Read under the marker: an execution that finished just before
        // has already activated the trade
        let Some(trade) = self.ledger.get_trade(trade_id) else {
            warn!(trade_id = %trade_id, "Execute requested for unknown trade");
            return false;
        };
        if trade.state != TradeState::Pending {
            debug!(trade_id = %trade_id, state = %trade.state, "Trade not pending");
            return false;
        }

        info!(trade_id = %trade_id, mode = %trade.mode, "Executing trade");
        let result = self
            .executor
            .execute_swap(&trade.asset_id, trade.direction, trade.size_native, trade.mode)
            .await;

        let outcome = result.map_err(|e| e.to_string()).and_then(|fill| {
            self.ledger
                .activate_trade(trade_id, fill.fill_price)
                .map(|_| fill)
                .map_err(|e| e.to_string())
        });

        match outcome {
            Ok(fill) => {
                self.monitor.start_monitoring(trade_id);
                self.notifier.send(NotificationEvent::ExecutionResult {
                    trade_id: trade_id.to_string(),
                    asset: trade.asset_label().to_string(),
                    success: true,
                    fill_price: Some(fill.fill_price),
                    error: None,
                });
                true
            }
            Err(error) => {
                warn!(trade_id = %trade_id, error = %error, "Execution failed");
                self.notifier.send(NotificationEvent::ExecutionResult {
                    trade_id: trade_id.to_string(),
                    asset: trade.asset_label().to_string(),
                    success: false,
                    fill_price: None,
                    error: Some(error),
                });
                false
            }
        }
    }

    /// Close an ACTIVE trade at the current oracle price
    pub async fn close_trade_manually(&self, trade_id: &str) -> AppResult<Trade> {
        let trade = self
            .ledger
            .get_trade(trade_id)
            .ok_or_else(|| AppError::NotFound(format!("trade {}", trade_id)))?;
        if trade.state != TradeState::Active {
            return Err(AppError::InvalidTransition(format!(
                "trade {} is {}",
                trade_id, trade.state
            )));
        }

        let price = self.oracle.get_price(&trade.asset_id).await.ok_or_else(|| {
            AppError::Validation(format!("no price available for {}", trade.asset_label()))
        })?;

        let closed = self.ledger.close_trade(trade_id, price, ExitReason::Manual)?;
        self.monitor.stop(trade_id);
        self.notifier.send(NotificationEvent::PositionClosed {
            trade_id: closed.id.clone(),
            asset: closed.asset_label().to_string(),
            reason: ExitReason::Manual,
            exit_price: price,
            pnl_native: closed.pnl_native.unwrap_or_default(),
            pnl_percent: closed.pnl_percent.unwrap_or_default(),
        });
        Ok(closed)
    }

    /// Stop every exit loop without closing positions
    pub fn stop_all_monitoring(&self) -> usize {
        self.monitor.stop_all()
    }

    /// Start exit loops for every ACTIVE trade not already monitored
    pub fn resume_monitoring(&self) -> usize {
        let resumed = self
            .ledger
            .active_trades()
            .iter()
            .filter(|trade| self.monitor.start_monitoring(&trade.id))
            .count();
        if resumed > 0 {
            info!(count = resumed, "Exit monitoring resumed");
        }
        resumed
    }
}
