//! Swap execution backends
//!
//! The copy engine hands a trade's asset, direction and size to a
//! [`SwapExecutor`] and records whatever fill price it reports. TEST mode
//! uses paper fills at the oracle price. REAL mode needs a live swap backend;
//! without one every execution fails and the trade stays PENDING.

use crate::models::{TradeDirection, TradeMode};
use crate::price_oracle::PriceOracle;
use async_trait::async_trait;
use std::sync::Arc;

/// Successful execution
#[derive(Debug, Clone, PartialEq)]
pub struct SwapFill {
    /// Price in SOL per token
    pub fill_price: f64,
    /// Transaction signature, absent for paper fills
    pub signature: Option<String>,
}

/// Executes a swap for a copied trade
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    async fn execute_swap(
        &self,
        asset_id: &str,
        direction: TradeDirection,
        size_native: f64,
        mode: TradeMode,
    ) -> anyhow::Result<SwapFill>;
}

/// Paper trading: fills immediately at the current oracle price
pub struct PaperExecutor {
    oracle: Arc<dyn PriceOracle>,
}

impl PaperExecutor {
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl SwapExecutor for PaperExecutor {
    async fn execute_swap(
        &self,
        asset_id: &str,
        direction: TradeDirection,
        size_native: f64,
        _mode: TradeMode,
    ) -> anyhow::Result<SwapFill> {
        let price = self
            .oracle
            .get_price(asset_id)
            .await
            .ok_or_else(|| ExecutorError::NoPrice(asset_id.to_string()))?;

        tracing::info!(
            asset = %asset_id,
            direction = %direction,
            size = size_native,
            price,
            "Paper fill"
        );
        Ok(SwapFill {
            fill_price: price,
            signature: None,
        })
    }
}

/// Stand-in for REAL mode when no live swap backend is wired
pub struct DisabledExecutor;

#[async_trait]
impl SwapExecutor for DisabledExecutor {
    async fn execute_swap(
        &self,
        _asset_id: &str,
        _direction: TradeDirection,
        _size_native: f64,
        mode: TradeMode,
    ) -> anyhow::Result<SwapFill> {
        Err(ExecutorError::LiveTradingUnavailable(mode).into())
    }
}

/// Executor errors
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// No price to fill against
    #[error("No price available for {0}")]
    NoPrice(String),

    /// No live swap backend
    #[error("No swap backend configured for {0} mode")]
    LiveTradingUnavailable(TradeMode),
}
