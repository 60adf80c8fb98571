//! Mutable runtime parameters
//!
//! Holds the operator's own risk parameters (trade size, TP/SL) and the
//! discovery/auto-copy switches. Reads hand out snapshot copies; writes go
//! through a single merge-update so every field changes atomically.

use crate::error::{AppError, AppResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Snapshot of the runtime parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Whether discovery processes transfer events
    #[serde(default = "default_discovery_enabled")]
    pub discovery_enabled: bool,
    /// Minimum qualifying transfer (SOL)
    #[serde(default = "default_min_transfer")]
    pub min_transfer: f64,
    /// Maximum qualifying transfer (SOL)
    #[serde(default = "default_max_transfer")]
    pub max_transfer: f64,
    /// Copied position size (SOL)
    #[serde(default = "default_trade_size")]
    pub trade_size: f64,
    #[serde(default = "default_tp_percent")]
    pub tp_percent: f64,
    #[serde(default = "default_sl_percent")]
    pub sl_percent: f64,
    /// Execute detected trades without confirmation
    #[serde(default = "default_auto_copy")]
    pub auto_copy: bool,
}

fn default_discovery_enabled() -> bool {
    true
}

fn default_min_transfer() -> f64 {
    0.5
}

fn default_max_transfer() -> f64 {
    10.0
}

fn default_trade_size() -> f64 {
    0.1
}

fn default_tp_percent() -> f64 {
    50.0
}

fn default_sl_percent() -> f64 {
    20.0
}

fn default_auto_copy() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            discovery_enabled: default_discovery_enabled(),
            min_transfer: default_min_transfer(),
            max_transfer: default_max_transfer(),
            trade_size: default_trade_size(),
            tp_percent: default_tp_percent(),
            sl_percent: default_sl_percent(),
            auto_copy: default_auto_copy(),
        }
    }
}

impl RuntimeConfig {
    /// Check value ranges
    pub fn validate(&self) -> AppResult<()> {
        if !(self.min_transfer.is_finite() && self.min_transfer >= 0.0) {
            return Err(AppError::Validation(format!(
                "min_transfer must be non-negative, got {}",
                self.min_transfer
            )));
        }
        if !(self.max_transfer.is_finite() && self.max_transfer >= self.min_transfer) {
            return Err(AppError::Validation(format!(
                "max_transfer ({}) must be >= min_transfer ({})",
                self.max_transfer, self.min_transfer
            )));
        }
        if !(self.trade_size.is_finite() && self.trade_size > 0.0) {
            return Err(AppError::Validation(format!(
                "trade_size must be positive, got {}",
                self.trade_size
            )));
        }
        validate_targets(self.tp_percent, self.sl_percent)
    }

    /// Whether an amount (SOL) falls in the discovery range, bounds inclusive
    pub fn in_transfer_range(&self, amount: f64) -> bool {
        amount >= self.min_transfer && amount <= self.max_transfer
    }
}

/// TP must be positive; SL must leave a positive stop price
pub fn validate_targets(tp_percent: f64, sl_percent: f64) -> AppResult<()> {
    if !(tp_percent.is_finite() && tp_percent > 0.0) {
        return Err(AppError::Validation(format!(
            "tp_percent must be positive, got {}",
            tp_percent
        )));
    }
    if !(sl_percent.is_finite() && sl_percent > 0.0 && sl_percent < 100.0) {
        return Err(AppError::Validation(format!(
            "sl_percent must be between 0 and 100, got {}",
            sl_percent
        )));
    }
    Ok(())
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeConfigUpdate {
    pub discovery_enabled: Option<bool>,
    pub min_transfer: Option<f64>,
    pub max_transfer: Option<f64>,
    pub trade_size: Option<f64>,
    pub tp_percent: Option<f64>,
    pub sl_percent: Option<f64>,
    pub auto_copy: Option<bool>,
}

impl RuntimeConfigUpdate {
    fn apply_to(&self, config: &mut RuntimeConfig) {
        if let Some(v) = self.discovery_enabled {
            config.discovery_enabled = v;
        }
        if let Some(v) = self.min_transfer {
            config.min_transfer = v;
        }
        if let Some(v) = self.max_transfer {
            config.max_transfer = v;
        }
        if let Some(v) = self.trade_size {
            config.trade_size = v;
        }
        if let Some(v) = self.tp_percent {
            config.tp_percent = v;
        }
        if let Some(v) = self.sl_percent {
            config.sl_percent = v;
        }
        if let Some(v) = self.auto_copy {
            config.auto_copy = v;
        }
    }
}

/// Owner of the live [`RuntimeConfig`]
#[derive(Debug)]
pub struct RuntimeConfigStore {
    inner: RwLock<RuntimeConfig>,
}

impl RuntimeConfigStore {
    pub fn new(initial: RuntimeConfig) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> RuntimeConfig {
        self.inner.read().clone()
    }

    /// Merge `update` into the current values.
    ///
    /// The merged result is validated before it is stored; on error nothing changes.
    pub fn update(&self, update: RuntimeConfigUpdate) -> AppResult<RuntimeConfig> {
        let mut guard = self.inner.write();
        let mut next = guard.clone();
        update.apply_to(&mut next);
        next.validate()?;
        *guard = next.clone();
        drop(guard);

        tracing::info!(
            discovery_enabled = next.discovery_enabled,
            min_transfer = next.min_transfer,
            max_transfer = next.max_transfer,
            trade_size = next.trade_size,
            tp_percent = next.tp_percent,
            sl_percent = next.sl_percent,
            auto_copy = next.auto_copy,
            "Runtime config updated"
        );
        Ok(next)
    }
}

impl Default for RuntimeConfigStore {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
