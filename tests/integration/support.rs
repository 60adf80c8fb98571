//! Shared fakes for the collaborator traits

#![allow(dead_code)]

use async_trait::async_trait;
use mirror_operator::discovery::{AccountAnalysis, AccountAnalyzer};
use mirror_operator::engine::{SwapExecutor, SwapFill};
use mirror_operator::ledger::Ledger;
use mirror_operator::listener::WatchRegistry;
use mirror_operator::models::{NewTrade, TradeDirection, TradeMode};
use mirror_operator::notifications::{NotificationEvent, NotificationSender};
use mirror_operator::price_oracle::PriceOracle;
use mirror_operator::runtime_config::{RuntimeConfig, RuntimeConfigStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const MASTER: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
pub const FRIEND: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const NEW_WALLET: &str = "HN7cABqLq46Es1jh92dQQisAq662SmxELLLsHHe4YWrH";
pub const STRANGER: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
pub const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

/// Oracle with settable prices; unknown assets have no price
#[derive(Default)]
pub struct FakeOracle {
    prices: Mutex<HashMap<String, f64>>,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, asset: &str, price: f64) {
        self.prices.lock().insert(asset.to_string(), price);
    }

    pub fn clear(&self, asset: &str) {
        self.prices.lock().remove(asset);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn get_price(&self, asset_id: &str) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prices.lock().get(asset_id).copied()
    }
}

/// Executor that fills at a fixed price or fails, optionally after a delay
pub struct FakeExecutor {
    fill_price: Mutex<Option<f64>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeExecutor {
    pub fn filling(price: f64) -> Arc<Self> {
        Arc::new(Self {
            fill_price: Mutex::new(Some(price)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fill_price: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(price: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fill_price: Mutex::new(Some(price)),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_fill(&self, price: Option<f64>) {
        *self.fill_price.lock() = price;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapExecutor for FakeExecutor {
    async fn execute_swap(
        &self,
        _asset_id: &str,
        _direction: TradeDirection,
        _size_native: f64,
        _mode: TradeMode,
    ) -> anyhow::Result<SwapFill> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let price = *self.fill_price.lock();
        match price {
            Some(fill_price) => Ok(SwapFill {
                fill_price,
                signature: Some("fill-sig".to_string()),
            }),
            None => anyhow::bail!("route not found"),
        }
    }
}

/// Analyzer returning a fixed profile
pub struct FakeAnalyzer {
    analysis: AccountAnalysis,
    delay: Duration,
}

impl FakeAnalyzer {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            analysis: AccountAnalysis::evaluate(3.0, 12, None, 1000.0),
            delay: Duration::ZERO,
        })
    }

    pub fn suspicious() -> Arc<Self> {
        Arc::new(Self {
            analysis: AccountAnalysis::evaluate(5000.0, 4, None, 1000.0),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            analysis: AccountAnalysis::evaluate(3.0, 12, None, 1000.0),
            delay,
        })
    }
}

#[async_trait]
impl AccountAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _address: &str) -> AccountAnalysis {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.analysis.clone()
    }
}

/// Records watch set changes
#[derive(Default)]
pub struct RecordingWatch {
    pub added: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
}

impl RecordingWatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl WatchRegistry for RecordingWatch {
    fn add_wallet(&self, address: &str) {
        self.added.lock().push(address.to_string());
    }

    fn remove_wallet(&self, address: &str) {
        self.removed.lock().push(address.to_string());
    }
}

pub fn ledger() -> Arc<Ledger> {
    Arc::new(Ledger::new(MASTER))
}

pub fn runtime() -> Arc<RuntimeConfigStore> {
    Arc::new(RuntimeConfigStore::new(RuntimeConfig::default()))
}

pub fn new_trade(direction: TradeDirection) -> NewTrade {
    NewTrade {
        source_account: MASTER.to_string(),
        asset_id: BONK.to_string(),
        asset_symbol: None,
        direction,
        size_native: 0.1,
        tp_percent: 50.0,
        sl_percent: 20.0,
        mode: TradeMode::Test,
        source_signature: None,
    }
}

pub fn notifier() -> (NotificationSender, mpsc::UnboundedReceiver<NotificationEvent>) {
    NotificationSender::channel()
}

/// Events queued so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `check` until it holds or the timeout elapses
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
