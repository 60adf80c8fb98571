//! Ledger of tracked accounts and copied trades
//!
//! The ledger is the sole writer of both collections. Every mutation runs
//! under one lock so it is atomic with respect to other tasks, and each
//! mutation wakes the persistence writer.

mod store;

pub use store::*;

use crate::error::{AppError, AppResult};
use crate::models::{
    AccountCategory, ExitReason, NewTrade, TrackedAccount, Trade, TradeState,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Persisted form of the ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub accounts: Vec<TrackedAccount>,
    #[serde(default)]
    pub trades: Vec<Trade>,
}

/// Aggregate trade statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub active_positions: usize,
    pub pending_trades: usize,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub total_pnl_native: f64,
    /// Share of closed trades with positive PnL
    pub win_rate_percent: f64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<String, TrackedAccount>,
    /// Insertion order
    trades: Vec<Trade>,
    index: HashMap<String, usize>,
}

impl LedgerState {
    fn trade_mut(&mut self, id: &str) -> AppResult<&mut Trade> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("trade {}", id)))?;
        Ok(&mut self.trades[idx])
    }
}

/// Tracked accounts and trades
#[derive(Debug)]
pub struct Ledger {
    master: String,
    state: RwLock<LedgerState>,
    changes: Notify,
}

impl Ledger {
    /// Empty ledger tracking only the master account
    pub fn new(master: impl Into<String>) -> Self {
        Self::restore(master, LedgerSnapshot::default())
    }

    /// Rebuild from a persisted snapshot; the master account is always present
    pub fn restore(master: impl Into<String>, snapshot: LedgerSnapshot) -> Self {
        let master = master.into();
        let mut state = LedgerState::default();

        for account in snapshot.accounts {
            state.accounts.insert(account.address.clone(), account);
        }
        let master_account = state
            .accounts
            .entry(master.clone())
            .or_insert_with(|| TrackedAccount::new(master.clone(), AccountCategory::Master));
        master_account.category = AccountCategory::Master;
        master_account.active = true;

        for trade in snapshot.trades {
            if state.index.contains_key(&trade.id) {
                continue;
            }
            let idx = state.trades.len();
            state.index.insert(trade.id.clone(), idx);
            state.trades.push(trade);
        }

        info!(
            accounts = state.accounts.len(),
            trades = state.trades.len(),
            "Ledger restored"
        );

        Self {
            master,
            state: RwLock::new(state),
            changes: Notify::new(),
        }
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    /// Wait until the next mutation
    pub async fn changed(&self) {
        self.changes.notified().await
    }

    fn mark_changed(&self) {
        self.changes.notify_one();
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Track an address, or re-activate it if it was removed.
    ///
    /// Returns false if the address was already active.
    pub fn add_account(&self, address: &str, category: AccountCategory) -> bool {
        let mut state = self.state.write();
        let added = match state.accounts.get_mut(address) {
            Some(existing) if existing.active => false,
            Some(existing) => {
                existing.active = true;
                if existing.category != AccountCategory::Master {
                    existing.category = category;
                }
                true
            }
            None => {
                state
                    .accounts
                    .insert(address.to_string(), TrackedAccount::new(address, category));
                true
            }
        };
        drop(state);

        if added {
            info!(address = %address, category = %category, "Account tracked");
            self.mark_changed();
        }
        added
    }

    /// Stop tracking an address. The master account cannot be removed.
    pub fn deactivate_account(&self, address: &str) -> bool {
        if address == self.master {
            return false;
        }
        let mut state = self.state.write();
        let changed = match state.accounts.get_mut(address) {
            Some(account) if account.active => {
                account.active = false;
                true
            }
            _ => false,
        };
        drop(state);

        if changed {
            info!(address = %address, "Account deactivated");
            self.mark_changed();
        }
        changed
    }

    /// Whether the address is tracked and active
    pub fn is_followed(&self, address: &str) -> bool {
        self.state
            .read()
            .accounts
            .get(address)
            .map(|a| a.active)
            .unwrap_or(false)
    }

    /// Addresses of all active accounts, master included
    pub fn active_accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self
            .state
            .read()
            .accounts
            .values()
            .filter(|a| a.active)
            .map(|a| a.address.clone())
            .collect();
        accounts.sort();
        accounts
    }

    /// All account records ordered by time added
    pub fn accounts(&self) -> Vec<TrackedAccount> {
        let mut accounts: Vec<TrackedAccount> =
            self.state.read().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.address.cmp(&b.address))
        });
        accounts
    }

    // =========================================================================
    // Trades
    // =========================================================================

    /// Record a new PENDING trade
    pub fn create_trade(&self, params: NewTrade) -> Trade {
        let trade = Trade::new(params);
        {
            let mut state = self.state.write();
            let idx = state.trades.len();
            state.index.insert(trade.id.clone(), idx);
            state.trades.push(trade.clone());
        }
        info!(
            trade_id = %trade.id,
            asset = %trade.asset_id,
            direction = %trade.direction,
            size = trade.size_native,
            "Trade created"
        );
        self.mark_changed();
        trade
    }

    pub fn get_trade(&self, id: &str) -> Option<Trade> {
        let state = self.state.read();
        state.index.get(id).map(|&idx| state.trades[idx].clone())
    }

    /// PENDING -> ACTIVE with the fill price
    pub fn activate_trade(&self, id: &str, entry_price: f64) -> AppResult<Trade> {
        let trade = {
            let mut state = self.state.write();
            let trade = state.trade_mut(id)?;
            trade
                .activate(entry_price)
                .map_err(AppError::InvalidTransition)?;
            trade.clone()
        };
        info!(trade_id = %id, entry_price, "Trade activated");
        self.mark_changed();
        Ok(trade)
    }

    /// ACTIVE -> CLOSED; only the first close for a trade succeeds
    pub fn close_trade(&self, id: &str, exit_price: f64, reason: ExitReason) -> AppResult<Trade> {
        let trade = {
            let mut state = self.state.write();
            let trade = state.trade_mut(id)?;
            trade
                .close(exit_price, reason)
                .map_err(AppError::InvalidTransition)?;
            trade.clone()
        };
        info!(
            trade_id = %id,
            exit_price,
            reason = %reason,
            pnl = trade.pnl_native.unwrap_or_default(),
            "Trade closed"
        );
        self.mark_changed();
        Ok(trade)
    }

    /// Override TP/SL on an open trade
    pub fn set_trade_targets(&self, id: &str, tp_percent: f64, sl_percent: f64) -> AppResult<Trade> {
        crate::runtime_config::validate_targets(tp_percent, sl_percent)?;
        let trade = {
            let mut state = self.state.write();
            let trade = state.trade_mut(id)?;
            trade
                .set_targets(tp_percent, sl_percent)
                .map_err(AppError::InvalidTransition)?;
            trade.clone()
        };
        debug!(trade_id = %id, tp_percent, sl_percent, "Trade targets updated");
        self.mark_changed();
        Ok(trade)
    }

    /// All trades in creation order
    pub fn trades(&self) -> Vec<Trade> {
        self.state.read().trades.clone()
    }

    pub fn active_trades(&self) -> Vec<Trade> {
        self.trades_in(TradeState::Active)
    }

    pub fn pending_trades(&self) -> Vec<Trade> {
        self.trades_in(TradeState::Pending)
    }

    fn trades_in(&self, wanted: TradeState) -> Vec<Trade> {
        self.state
            .read()
            .trades
            .iter()
            .filter(|t| t.state == wanted)
            .cloned()
            .collect()
    }

    /// Most recently created trade
    pub fn last_trade(&self) -> Option<Trade> {
        self.state.read().trades.last().cloned()
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.state.read();
        let mut stats = LedgerStats {
            total_trades: state.trades.len(),
            ..Default::default()
        };
        let mut wins = 0usize;

        for trade in &state.trades {
            match trade.state {
                TradeState::Pending => stats.pending_trades += 1,
                TradeState::Active => stats.active_positions += 1,
                TradeState::Closed => {
                    stats.closed_trades += 1;
                    let pnl = trade.pnl_native.unwrap_or_default();
                    stats.total_pnl_native += pnl;
                    if pnl > 0.0 {
                        wins += 1;
                    }
                }
            }
        }

        if stats.closed_trades > 0 {
            stats.win_rate_percent = wins as f64 / stats.closed_trades as f64 * 100.0;
        }
        stats
    }

    /// Copy of both collections for persistence
    pub fn snapshot(&self) -> LedgerSnapshot {
        let accounts = self.accounts();
        LedgerSnapshot {
            accounts,
            trades: self.trades(),
        }
    }
}
