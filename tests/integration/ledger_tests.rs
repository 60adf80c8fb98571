//! Ledger Integration Tests
//!
//! Tests ledger mutations under concurrent tasks and snapshot restore.

use super::support::*;
use mirror_operator::error::AppError;
use mirror_operator::ledger::{Ledger, LedgerSnapshot};
use mirror_operator::models::{AccountCategory, ExitReason, TrackedAccount, TradeDirection, TradeState};
use std::sync::Arc;

#[tokio::test]
async fn test_concurrent_trade_creation() {
    let ledger = ledger();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.create_trade(new_trade(TradeDirection::Buy)).id })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 32);
    assert_eq!(ledger.trades().len(), 32);
    assert_eq!(ledger.stats().pending_trades, 32);
}

#[tokio::test]
async fn test_close_race_has_one_winner() {
    let ledger = ledger();
    let trade = ledger.create_trade(new_trade(TradeDirection::Buy));
    ledger.activate_trade(&trade.id, 1.0).unwrap();

    let handles: Vec<_> = [(1.5, ExitReason::TakeProfit), (1.0, ExitReason::Manual)]
        .into_iter()
        .map(|(price, reason)| {
            let ledger = ledger.clone();
            let id = trade.id.clone();
            tokio::spawn(async move { ledger.close_trade(&id, price, reason).is_ok() })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(ledger.get_trade(&trade.id).unwrap().state, TradeState::Closed);
}

#[test]
fn test_unknown_trade_is_not_found() {
    let ledger = ledger();
    assert!(matches!(ledger.activate_trade("T-missing", 1.0), Err(AppError::NotFound(_))));
    assert!(matches!(
        ledger.close_trade("T-missing", 1.0, ExitReason::Manual),
        Err(AppError::NotFound(_))
    ));
    assert!(ledger.get_trade("T-missing").is_none());
}

#[test]
fn test_skipping_active_is_rejected() {
    let ledger = ledger();
    let trade = ledger.create_trade(new_trade(TradeDirection::Sell));
    assert!(matches!(
        ledger.close_trade(&trade.id, 1.0, ExitReason::Manual),
        Err(AppError::InvalidTransition(_))
    ));
    assert_eq!(ledger.get_trade(&trade.id).unwrap().state, TradeState::Pending);
}

#[test]
fn test_account_lifecycle() {
    let ledger = ledger();
    assert!(ledger.is_followed(MASTER));

    assert!(ledger.add_account(FRIEND, AccountCategory::Followed));
    assert!(!ledger.add_account(FRIEND, AccountCategory::Discovered), "add is idempotent");
    assert!(ledger.deactivate_account(FRIEND));
    assert!(!ledger.is_followed(FRIEND));

    assert!(ledger.add_account(FRIEND, AccountCategory::Discovered), "re-activation");
    let accounts = ledger.accounts();
    assert_eq!(accounts.iter().filter(|a| a.address == FRIEND).count(), 1);
    let friend = accounts.iter().find(|a| a.address == FRIEND).unwrap();
    assert!(friend.active);
    assert_eq!(friend.category, AccountCategory::Discovered);

    assert!(!ledger.deactivate_account(MASTER), "master stays tracked");
    assert_eq!(ledger.active_accounts().len(), 2);
}

#[test]
fn test_restore_keeps_master_and_trades() {
    let before = ledger();
    before.add_account(FRIEND, AccountCategory::Followed);
    let trade = before.create_trade(new_trade(TradeDirection::Buy));
    before.activate_trade(&trade.id, 2.0).unwrap();

    let mut snapshot = before.snapshot();
    // A snapshot that lost or demoted the master account
    snapshot.accounts.retain(|a| a.address != MASTER);
    let mut demoted = TrackedAccount::new(MASTER, AccountCategory::Followed);
    demoted.active = false;
    snapshot.accounts.push(demoted);
    snapshot.trades.push(snapshot.trades[0].clone());

    let restored = Ledger::restore(MASTER, snapshot);
    assert!(restored.is_followed(MASTER));
    assert!(restored.is_followed(FRIEND));
    let master = restored
        .accounts()
        .into_iter()
        .find(|a| a.address == MASTER)
        .unwrap();
    assert_eq!(master.category, AccountCategory::Master);

    assert_eq!(restored.trades().len(), 1, "duplicate ids are dropped");
    assert_eq!(restored.active_trades()[0].entry_price, Some(2.0));
}

#[test]
fn test_stats_and_last_trade() {
    let ledger = Arc::new(Ledger::restore(MASTER, LedgerSnapshot::default()));
    assert!(ledger.last_trade().is_none());

    let win = ledger.create_trade(new_trade(TradeDirection::Buy));
    ledger.activate_trade(&win.id, 1.0).unwrap();
    ledger.close_trade(&win.id, 1.5, ExitReason::TakeProfit).unwrap();

    let loss = ledger.create_trade(new_trade(TradeDirection::Buy));
    ledger.activate_trade(&loss.id, 1.0).unwrap();
    ledger.close_trade(&loss.id, 0.8, ExitReason::StopLoss).unwrap();

    let open = ledger.create_trade(new_trade(TradeDirection::Buy));
    ledger.activate_trade(&open.id, 1.0).unwrap();
    let pending = ledger.create_trade(new_trade(TradeDirection::Sell));

    let stats = ledger.stats();
    assert_eq!(stats.total_trades, 4);
    assert_eq!(stats.closed_trades, 2);
    assert_eq!(stats.active_positions, 1);
    assert_eq!(stats.pending_trades, 1);
    assert!((stats.win_rate_percent - 50.0).abs() < 1e-9);
    assert!((stats.total_pnl_native - 0.03).abs() < 1e-9);
    assert_eq!(ledger.last_trade().unwrap().id, pending.id);
}

#[test]
fn test_targets_override() {
    let ledger = ledger();
    let trade = ledger.create_trade(new_trade(TradeDirection::Buy));
    ledger.activate_trade(&trade.id, 1.0).unwrap();

    let updated = ledger.set_trade_targets(&trade.id, 10.0, 5.0).unwrap();
    assert_eq!(updated.tp_percent, 10.0);
    assert_eq!(updated.exit_trigger(1.2), Some(ExitReason::TakeProfit));

    assert!(ledger.set_trade_targets(&trade.id, 10.0, 150.0).is_err());
    ledger.close_trade(&trade.id, 1.05, ExitReason::Manual).unwrap();
    assert!(matches!(
        ledger.set_trade_targets(&trade.id, 10.0, 5.0),
        Err(AppError::InvalidTransition(_))
    ));
}
