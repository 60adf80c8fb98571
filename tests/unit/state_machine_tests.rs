//! State Machine Unit Tests
//!
//! Tests trade state transitions:
//! - PENDING->ACTIVE->CLOSED
//! - No backward or skipping transitions

use mirror_operator::models::{ExitReason, NewTrade, Trade, TradeDirection, TradeMode, TradeState};

fn pending_trade(direction: TradeDirection) -> Trade {
    Trade::new(NewTrade {
        source_account: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string(),
        asset_id: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263".to_string(),
        asset_symbol: None,
        direction,
        size_native: 0.1,
        tp_percent: 50.0,
        sl_percent: 20.0,
        mode: TradeMode::Test,
        source_signature: None,
    })
}

#[test]
fn test_pending_to_active_valid() {
    assert!(
        TradeState::Pending.can_transition_to(TradeState::Active),
        "PENDING -> ACTIVE should be valid"
    );
}

#[test]
fn test_active_to_closed_valid() {
    assert!(
        TradeState::Active.can_transition_to(TradeState::Closed),
        "ACTIVE -> CLOSED should be valid"
    );
}

#[test]
fn test_invalid_transitions() {
    assert!(!TradeState::Pending.can_transition_to(TradeState::Closed));
    assert!(!TradeState::Active.can_transition_to(TradeState::Pending));
    assert!(!TradeState::Closed.can_transition_to(TradeState::Active));
    assert!(!TradeState::Closed.can_transition_to(TradeState::Pending));
    assert!(!TradeState::Active.can_transition_to(TradeState::Active));
}

#[test]
fn test_terminal_state() {
    assert!(TradeState::Closed.is_terminal());
    assert!(!TradeState::Pending.is_terminal());
    assert!(!TradeState::Active.is_terminal());
}

#[test]
fn test_new_trade_is_pending() {
    let trade = pending_trade(TradeDirection::Buy);
    assert_eq!(trade.state, TradeState::Pending);
    assert!(trade.id.starts_with('T'));
    assert!(trade.entry_price.is_none());
    assert!(trade.pnl_native.is_none());
}

#[test]
fn test_trade_ids_unique() {
    let a = pending_trade(TradeDirection::Buy);
    let b = pending_trade(TradeDirection::Buy);
    assert_ne!(a.id, b.id);
}

#[test]
fn test_full_lifecycle() {
    let mut trade = pending_trade(TradeDirection::Buy);
    trade.activate(2.0).unwrap();
    assert_eq!(trade.state, TradeState::Active);
    assert_eq!(trade.entry_price, Some(2.0));

    trade.close(3.0, ExitReason::TakeProfit).unwrap();
    assert_eq!(trade.state, TradeState::Closed);
    assert_eq!(trade.exit_reason, Some(ExitReason::TakeProfit));
    assert!((trade.pnl_native.unwrap() - 0.05).abs() < 1e-12);
    assert!((trade.pnl_percent.unwrap() - 50.0).abs() < 1e-9);
}

#[test]
fn test_close_requires_active() {
    let mut trade = pending_trade(TradeDirection::Buy);
    assert!(trade.close(1.0, ExitReason::Manual).is_err());
    assert_eq!(trade.state, TradeState::Pending);
}

#[test]
fn test_activate_once() {
    let mut trade = pending_trade(TradeDirection::Buy);
    trade.activate(1.0).unwrap();
    assert!(trade.activate(2.0).is_err());
    assert_eq!(trade.entry_price, Some(1.0));
}

#[test]
fn test_activate_rejects_bad_price() {
    let mut trade = pending_trade(TradeDirection::Buy);
    assert!(trade.activate(0.0).is_err());
    assert!(trade.activate(f64::NAN).is_err());
    assert_eq!(trade.state, TradeState::Pending);
}

#[test]
fn test_closed_trade_is_immutable() {
    let mut trade = pending_trade(TradeDirection::Sell);
    trade.activate(1.0).unwrap();
    trade.close(0.5, ExitReason::TakeProfit).unwrap();

    assert!(trade.close(0.1, ExitReason::Manual).is_err());
    assert!(trade.set_targets(10.0, 5.0).is_err());
    assert_eq!(trade.exit_price, Some(0.5));
    assert_eq!(trade.tp_percent, 50.0);
}
