//! Command Parsing Unit Tests

use mirror_operator::commands::{CommandParseError, ControlCommand};

const ADDR: &str = "HN7cABqLq46Es1jh92dQQisAq662SmxELLLsHHe4YWrH";

fn parse(text: &str) -> Result<ControlCommand, CommandParseError> {
    text.parse()
}

#[test]
fn test_parameter_commands() {
    assert_eq!(parse("/tp 75"), Ok(ControlCommand::SetTakeProfit(75.0)));
    assert_eq!(parse("/sl 12.5"), Ok(ControlCommand::SetStopLoss(12.5)));
    assert_eq!(
        parse("/range 1 5"),
        Ok(ControlCommand::SetTransferRange { min: 1.0, max: 5.0 })
    );
    assert_eq!(parse("/autocopy ON"), Ok(ControlCommand::SetAutoCopy(true)));
}

#[test]
fn test_trade_commands() {
    assert_eq!(parse("/execute T0192abc"), Ok(ControlCommand::Execute("T0192abc".to_string())));
    assert_eq!(parse("/close T1"), Ok(ControlCommand::Close("T1".to_string())));
    assert_eq!(
        parse("/targets T1 30 10"),
        Ok(ControlCommand::SetTargets {
            trade_id: "T1".to_string(),
            tp: 30.0,
            sl: 10.0
        })
    );
}

#[test]
fn test_wallet_commands() {
    assert_eq!(parse(&format!("/follow {}", ADDR)), Ok(ControlCommand::Follow(ADDR.to_string())));
    assert_eq!(
        parse(&format!("/unfollow {}", ADDR)),
        Ok(ControlCommand::Unfollow(ADDR.to_string()))
    );
    assert_eq!(
        parse(&format!("/ignore {}", ADDR)),
        Ok(ControlCommand::IgnoreCandidate(ADDR.to_string()))
    );
}

#[test]
fn test_query_commands() {
    assert_eq!(parse("/positions"), Ok(ControlCommand::Positions));
    assert_eq!(parse("/wallets"), Ok(ControlCommand::Wallets));
    assert_eq!(parse("/last"), Ok(ControlCommand::LastTrade));
    assert_eq!(parse("/config"), Ok(ControlCommand::ShowConfig));
    assert_eq!(parse("/candidates"), Ok(ControlCommand::Candidates));
    assert_eq!(parse("  /help  "), Ok(ControlCommand::Help));
}

#[test]
fn test_usage_errors() {
    assert!(matches!(parse("/range 1"), Err(CommandParseError::Usage(_))));
    assert!(matches!(parse("/targets T1 30"), Err(CommandParseError::Usage(_))));
    assert!(matches!(parse("/discovery maybe"), Err(CommandParseError::Usage(_))));
    assert!(matches!(parse("/size 1 2"), Err(CommandParseError::Usage(_))));
    assert_eq!(parse(""), Err(CommandParseError::NotACommand));
}
