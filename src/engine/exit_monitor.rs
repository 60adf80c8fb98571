//! Exit monitoring for active positions
//!
//! One cancellable polling task per ACTIVE trade. Each tick reads the
//! oracle price and closes the trade when it crosses take-profit or
//! stop-loss. A missing price skips the tick.

use crate::ledger::Ledger;
use crate::models::{ExitReason, TradeState};
use crate::notifications::{NotificationEvent, NotificationSender};
use crate::price_oracle::PriceOracle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one price check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Oracle had no price; nothing changed
    NoPrice,
    /// Price inside the TP/SL band
    Holding,
    /// Trade closed on this tick
    Closed(ExitReason),
    /// Trade missing or no longer ACTIVE
    NotActive,
    /// Monitoring was stopped while the price was being fetched
    Cancelled,
}

struct MonitorTask {
    generation: u64,
    cancel: CancellationToken,
}

/// Per-trade TP/SL polling
pub struct ExitMonitor {
    ledger: Arc<Ledger>,
    oracle: Arc<dyn PriceOracle>,
    notifier: NotificationSender,
    poll_interval: Duration,
    tasks: Mutex<HashMap<String, MonitorTask>>,
    generation: AtomicU64,
}

impl ExitMonitor {
    pub fn new(
        ledger: Arc<Ledger>,
        oracle: Arc<dyn PriceOracle>,
        notifier: NotificationSender,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            oracle,
            notifier,
            poll_interval,
            tasks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Spawn the polling loop for a trade. Returns false if already monitored.
    pub fn start_monitoring(self: &Arc<Self>, trade_id: &str) -> bool {
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut tasks = self.tasks.lock();
            if tasks.contains_key(trade_id) {
                return false;
            }
            tasks.insert(
                trade_id.to_string(),
                MonitorTask {
                    generation,
                    cancel: cancel.clone(),
                },
            );
        }

        info!(
            trade_id = %trade_id,
            interval_secs = self.poll_interval.as_secs_f64(),
            "Exit monitoring started"
        );

        let monitor = Arc::clone(self);
        let trade_id = trade_id.to_string();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + monitor.poll_interval, monitor.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match monitor.check(&trade_id, &cancel).await {
                            TickOutcome::Closed(_) | TickOutcome::NotActive | TickOutcome::Cancelled => break,
                            TickOutcome::NoPrice | TickOutcome::Holding => {}
                        }
                    }
                }
            }

            monitor.forget(&trade_id, generation);
            debug!(trade_id = %trade_id, "Exit monitoring loop ended");
        });
        true
    }

    /// Run one price check now
    pub async fn tick(&self, trade_id: &str) -> TickOutcome {
        self.check(trade_id, &CancellationToken::new()).await
    }

    async fn check(&self, trade_id: &str, cancel: &CancellationToken) -> TickOutcome {
        let Some(trade) = self.ledger.get_trade(trade_id) else {
            return TickOutcome::NotActive;
        };
        if trade.state != TradeState::Active {
            return TickOutcome::NotActive;
        }

        let price = self.oracle.get_price(&trade.asset_id).await;
        if cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        let Some(price) = price else {
            debug!(trade_id = %trade_id, "No price, skipping tick");
            return TickOutcome::NoPrice;
        };

        // Re-read: targets may have changed or the trade closed while fetching
        let Some(trade) = self.ledger.get_trade(trade_id) else {
            return TickOutcome::NotActive;
        };
        let Some(reason) = trade.exit_trigger(price) else {
            return if trade.state == TradeState::Active {
                TickOutcome::Holding
            } else {
                TickOutcome::NotActive
            };
        };

        match self.ledger.close_trade(trade_id, price, reason) {
            Ok(closed) => {
                self.stop(trade_id);
                self.notifier.send(NotificationEvent::PositionClosed {
                    trade_id: closed.id.clone(),
                    asset: closed.asset_label().to_string(),
                    reason,
                    exit_price: price,
                    pnl_native: closed.pnl_native.unwrap_or_default(),
                    pnl_percent: closed.pnl_percent.unwrap_or_default(),
                });
                TickOutcome::Closed(reason)
            }
            Err(e) => {
                warn!(trade_id = %trade_id, error = %e, "Close rejected");
                TickOutcome::NotActive
            }
        }
    }

    /// Cancel one trade's loop without closing it
    pub fn stop(&self, trade_id: &str) -> bool {
        match self.tasks.lock().remove(trade_id) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every loop; positions stay ACTIVE
    pub fn stop_all(&self) -> usize {
        let tasks: Vec<MonitorTask> = self.tasks.lock().drain().map(|(_, t)| t).collect();
        for task in &tasks {
            task.cancel.cancel();
        }
        if !tasks.is_empty() {
            info!(count = tasks.len(), "Exit monitoring stopped");
        }
        tasks.len()
    }

    pub fn is_monitoring(&self, trade_id: &str) -> bool {
        self.tasks.lock().contains_key(trade_id)
    }

    pub fn monitored_count(&self) -> usize {
        self.tasks.lock().len()
    }

    fn forget(&self, trade_id: &str, generation: u64) {
        let mut tasks = self.tasks.lock();
        if tasks.get(trade_id).map(|t| t.generation) == Some(generation) {
            tasks.remove(trade_id);
        }
    }
}
