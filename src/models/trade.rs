//! Trade models - represents copied position state and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction copied from the source account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "BUY"),
            TradeDirection::Sell => write!(f, "SELL"),
        }
    }
}

/// Execution mode the trade was opened under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeMode {
    /// Paper trading, fills simulated at the oracle price
    Test,
    /// Live swaps through the execution backend
    Real,
}

impl std::fmt::Display for TradeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeMode::Test => write!(f, "TEST"),
            TradeMode::Real => write!(f, "REAL"),
        }
    }
}

impl std::str::FromStr for TradeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TEST" => Ok(TradeMode::Test),
            "REAL" => Ok(TradeMode::Real),
            _ => Err(format!("Unknown trade mode: {}", s)),
        }
    }
}

/// Trade state representing the state machine
///
/// State transitions:
/// ```text
/// PENDING -> ACTIVE -> CLOSED
/// ```
/// A trade never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeState {
    /// Detected, awaiting execution
    Pending,
    /// Filled, exit conditions monitored
    Active,
    /// Exited, PnL recorded
    Closed,
}

impl TradeState {
    /// Check if transition to new state is valid
    pub fn can_transition_to(&self, new_state: TradeState) -> bool {
        use TradeState::*;

        matches!((self, new_state), (Pending, Active) | (Active, Closed))
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeState::Closed)
    }
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeState::Pending => write!(f, "PENDING"),
            TradeState::Active => write!(f, "ACTIVE"),
            TradeState::Closed => write!(f, "CLOSED"),
        }
    }
}

impl std::str::FromStr for TradeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(TradeState::Pending),
            "ACTIVE" => Ok(TradeState::Active),
            "CLOSED" => Ok(TradeState::Closed),
            _ => Err(format!("Unknown trade state: {}", s)),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    /// Closed by an operator command
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Parameters for opening a trade, taken from the operator's runtime config
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub source_account: String,
    pub asset_id: String,
    pub asset_symbol: Option<String>,
    pub direction: TradeDirection,
    pub size_native: f64,
    pub tp_percent: f64,
    pub sl_percent: f64,
    pub mode: TradeMode,
    /// Signature of the source transaction
    pub source_signature: Option<String>,
}

/// Trade record representing a complete copied-trade lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique, time-ordered identifier
    pub id: String,
    /// Account whose activity was copied
    pub source_account: String,
    /// Token mint address
    pub asset_id: String,
    /// Token symbol
    #[serde(default)]
    pub asset_symbol: Option<String>,
    pub direction: TradeDirection,
    pub state: TradeState,
    /// Position size in SOL
    pub size_native: f64,
    pub tp_percent: f64,
    pub sl_percent: f64,
    pub mode: TradeMode,
    /// Fill price (in SOL per token), set once on activation
    #[serde(default)]
    pub entry_price: Option<f64>,
    /// Exit price, set once on close
    #[serde(default)]
    pub exit_price: Option<f64>,
    /// Realized PnL in SOL
    #[serde(default)]
    pub pnl_native: Option<f64>,
    #[serde(default)]
    pub pnl_percent: Option<f64>,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
    #[serde(default)]
    pub source_signature: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Create a new PENDING trade
    pub fn new(params: NewTrade) -> Self {
        let now = Utc::now();
        Self {
            id: generate_trade_id(),
            source_account: params.source_account,
            asset_id: params.asset_id,
            asset_symbol: params.asset_symbol,
            direction: params.direction,
            state: TradeState::Pending,
            size_native: params.size_native,
            tp_percent: params.tp_percent,
            sl_percent: params.sl_percent,
            mode: params.mode,
            entry_price: None,
            exit_price: None,
            pnl_native: None,
            pnl_percent: None,
            exit_reason: None,
            source_signature: params.source_signature,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display label (symbol if known, else the mint)
    pub fn asset_label(&self) -> &str {
        self.asset_symbol.as_deref().unwrap_or(&self.asset_id)
    }

    /// PENDING -> ACTIVE, recording the fill price
    pub fn activate(&mut self, entry_price: f64) -> Result<(), String> {
        if !self.state.can_transition_to(TradeState::Active) {
            return Err(format!(
                "Invalid state transition: {} -> {}",
                self.state,
                TradeState::Active
            ));
        }
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(format!("Invalid entry price: {}", entry_price));
        }
        self.entry_price = Some(entry_price);
        self.state = TradeState::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// ACTIVE -> CLOSED, recording exit price and realized PnL
    pub fn close(&mut self, exit_price: f64, reason: ExitReason) -> Result<(), String> {
        if !self.state.can_transition_to(TradeState::Closed) {
            return Err(format!(
                "Invalid state transition: {} -> {}",
                self.state,
                TradeState::Closed
            ));
        }
        let entry_price = self
            .entry_price
            .ok_or_else(|| "Active trade has no entry price".to_string())?;

        let (pnl_native, pnl_percent) =
            realized_pnl(self.direction, entry_price, exit_price, self.size_native);

        self.exit_price = Some(exit_price);
        self.pnl_native = Some(pnl_native);
        self.pnl_percent = Some(pnl_percent);
        self.exit_reason = Some(reason);
        self.state = TradeState::Closed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Override TP/SL before the position closes
    pub fn set_targets(&mut self, tp_percent: f64, sl_percent: f64) -> Result<(), String> {
        if self.state.is_terminal() {
            return Err(format!("Trade {} is already closed", self.id));
        }
        self.tp_percent = tp_percent;
        self.sl_percent = sl_percent;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Decide whether the current price crosses TP or SL.
    ///
    /// TP is checked first, so a gap move across both thresholds closes as TAKE_PROFIT.
    pub fn exit_trigger(&self, price: f64) -> Option<ExitReason> {
        if self.state != TradeState::Active {
            return None;
        }
        let entry = self.entry_price?;
        let up = entry * (1.0 + self.tp_percent / 100.0);
        let down = entry * (1.0 - self.sl_percent / 100.0);

        match self.direction {
            TradeDirection::Buy => {
                if price >= up {
                    Some(ExitReason::TakeProfit)
                } else if price <= down {
                    Some(ExitReason::StopLoss)
                } else {
                    None
                }
            }
            TradeDirection::Sell => {
                let tp_level = entry * (1.0 - self.tp_percent / 100.0);
                let sl_level = entry * (1.0 + self.sl_percent / 100.0);
                if price <= tp_level {
                    Some(ExitReason::TakeProfit)
                } else if price >= sl_level {
                    Some(ExitReason::StopLoss)
                } else {
                    None
                }
            }
        }
    }
}

/// Realized PnL in SOL and percent of position size
pub fn realized_pnl(
    direction: TradeDirection,
    entry_price: f64,
    exit_price: f64,
    size_native: f64,
) -> (f64, f64) {
    let quantity = if entry_price > 0.0 {
        size_native / entry_price
    } else {
        0.0
    };
    let pnl = match direction {
        TradeDirection::Buy => (exit_price - entry_price) * quantity,
        TradeDirection::Sell => (entry_price - exit_price) * quantity,
    };
    let pnl_percent = if size_native > 0.0 {
        pnl / size_native * 100.0
    } else {
        0.0
    };
    (pnl, pnl_percent)
}

/// Time-ordered unique trade id
fn generate_trade_id() -> String {
    format!("T{}", uuid::Uuid::now_v7().simple())
}
