//! Log Classifier Unit Tests
//!
//! Tests the swap and transfer recognition rules:
//! - Direction from marker order
//! - Asset extraction skipping the native mint
//! - Transfer range filtering and origin defaulting

use mirror_operator::constants::mints;
use mirror_operator::listener::{HeuristicClassifier, LogClassifier};
use mirror_operator::models::{ClassifiedEvent, TradeDirection};
use mirror_operator::runtime_config::{RuntimeConfig, RuntimeConfigStore, RuntimeConfigUpdate};
use std::sync::Arc;

const MASTER: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
const FRIEND: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
const NEW_WALLET: &str = "HN7cABqLq46Es1jh92dQQisAq662SmxELLLsHHe4YWrH";

fn classifier() -> (HeuristicClassifier, Arc<RuntimeConfigStore>) {
    let runtime = Arc::new(RuntimeConfigStore::new(RuntimeConfig::default()));
    (HeuristicClassifier::new(MASTER, runtime.clone()), runtime)
}

fn logs(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

#[test]
fn test_buy_swap_from_before_to() {
    let (classifier, _) = classifier();
    let logs = logs(&[
        "Program log: Instruction: Swap",
        "Program log: from: wsol",
        &format!("Program log: to: {}", BONK),
        "Program log: Transfer: 1.5 SOL",
    ]);

    let event = classifier.classify(&logs, "sig1").expect("swap event");
    match event {
        ClassifiedEvent::Swap {
            direction,
            source_account,
            asset_id,
            amount_sol,
            signature,
        } => {
            assert_eq!(direction, TradeDirection::Buy);
            assert_eq!(source_account, MASTER);
            assert_eq!(asset_id.as_deref(), Some(BONK));
            assert_eq!(amount_sol, Some(1.5));
            assert_eq!(signature, "sig1");
        }
        other => panic!("expected swap, got {:?}", other),
    }
}

#[test]
fn test_marker_order_decides_direction() {
    let (classifier, _) = classifier();
    let from_line = format!("Program log: from: {}", mints::SOL);
    let to_line = format!("Program log: to: {}", BONK);

    let swap = "Program log: Instruction: Swap";
    let amount = "Program log: Transfer: 2.5 SOL";

    let cases = [
        (logs(&[swap, &from_line, &to_line, amount]), TradeDirection::Buy),
        (logs(&[swap, &to_line, &from_line, amount]), TradeDirection::Sell),
    ];

    for (logs, expected) in cases {
        match classifier.classify(&logs, "sig-order") {
            Some(ClassifiedEvent::Swap {
                direction,
                asset_id,
                amount_sol,
                ..
            }) => {
                assert_eq!(direction, expected);
                assert_eq!(asset_id.as_deref(), Some(BONK));
                assert_eq!(amount_sol, Some(2.5));
            }
            other => panic!("expected swap, got {:?}", other),
        }
    }
}

#[test]
fn test_sell_swap_skips_native_mint() {
    let (classifier, _) = classifier();
    let logs = logs(&[
        "Program log: Instruction: Swap",
        &format!("Program log: to: {}", mints::SOL),
        &format!("Program log: from: {}", BONK),
    ]);

    let event = classifier.classify(&logs, "sig2").expect("swap event");
    assert_eq!(event.kind(), "SELL");
    match event {
        ClassifiedEvent::Swap { asset_id, amount_sol, .. } => {
            assert_eq!(asset_id.as_deref(), Some(BONK));
            assert_eq!(amount_sol, None);
        }
        other => panic!("expected swap, got {:?}", other),
    }
}

#[test]
fn test_swap_without_asset_address() {
    let (classifier, _) = classifier();
    let logs = logs(&["Instruction: Swap", "from: wsol", "to: somewhere"]);

    match classifier.classify(&logs, "sig3") {
        Some(ClassifiedEvent::Swap { asset_id, .. }) => assert!(asset_id.is_none()),
        other => panic!("expected swap, got {:?}", other),
    }
}

#[test]
fn test_swap_needs_native_reference() {
    let (classifier, _) = classifier();
    let logs = logs(&[
        "Instruction: Swap",
        &format!("from: {}", FRIEND),
        &format!("to: {}", BONK),
    ]);
    assert!(classifier.classify(&logs, "sig4").is_none());
}

#[test]
fn test_swap_needs_both_markers() {
    let (classifier, _) = classifier();
    let logs = logs(&["Instruction: Swap", "from: wsol", BONK]);
    assert!(classifier.classify(&logs, "sig5").is_none());
}

#[test]
fn test_transfer_in_range() {
    let (classifier, _) = classifier();
    let logs = logs(&[
        "Program 11111111111111111111111111111111 invoke [1]",
        &format!("Transfer: from: {} to: {} 1500000000 lamports", FRIEND, NEW_WALLET),
    ]);

    let event = classifier.classify(&logs, "sig6").expect("transfer event");
    assert_eq!(
        event,
        ClassifiedEvent::Transfer {
            from: FRIEND.to_string(),
            to: NEW_WALLET.to_string(),
            amount_sol: 1.5,
            signature: "sig6".to_string(),
        }
    );
}

#[test]
fn test_transfer_origin_defaults_to_master() {
    let (classifier, _) = classifier();
    let logs = logs(&[&format!("Transfer to: {} 2000000000 lamports", NEW_WALLET)]);

    match classifier.classify(&logs, "sig7") {
        Some(ClassifiedEvent::Transfer { from, amount_sol, .. }) => {
            assert_eq!(from, MASTER);
            assert_eq!(amount_sol, 2.0);
        }
        other => panic!("expected transfer, got {:?}", other),
    }
}

#[test]
fn test_transfer_bounds_are_inclusive() {
    let (classifier, _) = classifier();
    let at_min = logs(&[&format!("Transfer to: {} 500000000 lamports", NEW_WALLET)]);
    let at_max = logs(&[&format!("Transfer to: {} 10000000000 lamports", NEW_WALLET)]);
    let above = logs(&[&format!("Transfer to: {} 10000000001 lamports", NEW_WALLET)]);

    assert!(classifier.classify(&at_min, "a").is_some());
    assert!(classifier.classify(&at_max, "b").is_some());
    assert!(classifier.classify(&above, "c").is_none());
}

#[test]
fn test_transfer_without_recipient() {
    let (classifier, _) = classifier();
    let logs = logs(&["Transfer 1500000000 lamports"]);
    assert!(classifier.classify(&logs, "sig8").is_none());
}

#[test]
fn test_transfer_range_follows_runtime_config() {
    let (classifier, runtime) = classifier();
    let logs = logs(&[&format!("Transfer to: {} 1500000000 lamports", NEW_WALLET)]);
    assert!(classifier.classify(&logs, "sig9").is_some());

    runtime
        .update(RuntimeConfigUpdate {
            min_transfer: Some(2.0),
            ..Default::default()
        })
        .unwrap();
    assert!(classifier.classify(&logs, "sig9").is_none());
}

#[test]
fn test_unrelated_logs_yield_nothing() {
    let (classifier, _) = classifier();
    let logs = logs(&["Program log: Instruction: InitializeAccount", "Program consumed 1200 units"]);
    assert!(classifier.classify(&logs, "sig10").is_none());
    assert!(classifier.classify(&[], "sig11").is_none());
}
