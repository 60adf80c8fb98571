//! Classified chain events

use super::TradeDirection;
use serde::{Deserialize, Serialize};

/// Typed result of interpreting a transaction's log lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassifiedEvent {
    /// Native transfer between two accounts
    Transfer {
        from: String,
        to: String,
        amount_sol: f64,
        signature: String,
    },
    /// Swap against the native asset
    Swap {
        direction: TradeDirection,
        source_account: String,
        /// First non-native mint found in the logs
        asset_id: Option<String>,
        amount_sol: Option<f64>,
        signature: String,
    },
}

impl ClassifiedEvent {
    pub fn signature(&self) -> &str {
        match self {
            ClassifiedEvent::Transfer { signature, .. } => signature,
            ClassifiedEvent::Swap { signature, .. } => signature,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedEvent::Transfer { .. } => "TRANSFER",
            ClassifiedEvent::Swap {
                direction: TradeDirection::Buy,
                ..
            } => "BUY",
            ClassifiedEvent::Swap {
                direction: TradeDirection::Sell,
                ..
            } => "SELL",
        }
    }
}
