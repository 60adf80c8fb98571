//! Wallet discovery
//!
//! Watches native transfers sent by tracked accounts and proposes the
//! recipients as new wallets to follow. Each recipient is proposed at most
//! once per retention window.

mod analyzer;

pub use analyzer::{AccountAnalysis, AccountAnalyzer, RpcAccountAnalyzer};

use crate::ledger::Ledger;
use crate::listener::WatchRegistry;
use crate::models::AccountCategory;
use crate::notifications::{NotificationEvent, NotificationSender};
use crate::runtime_config::RuntimeConfigStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A wallet seen receiving a qualifying transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredCandidate {
    pub address: String,
    pub discovered_at: DateTime<Utc>,
    pub transfer_amount: f64,
    pub from_account: String,
    /// Set once the candidate has been reported or absorbed
    pub notified: bool,
    /// Operator chose not to follow
    pub ignored: bool,
    /// Cached risk check
    pub analysis: Option<AccountAnalysis>,
}

/// Result of processing one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Disabled,
    OutOfRange,
    UntrackedSource,
    AlreadyFollowed,
    AlreadyCandidate,
    /// Recorded but not reported
    Suspicious,
    /// Recorded and reported
    Notified,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryStats {
    pub total: usize,
    /// Candidates now followed
    pub added: usize,
    pub pending: usize,
    pub avg_transfer_amount: f64,
}

/// Discovery engine
pub struct DiscoveryEngine {
    enabled: AtomicBool,
    runtime: Arc<RuntimeConfigStore>,
    ledger: Arc<Ledger>,
    analyzer: Arc<dyn AccountAnalyzer>,
    watch: Arc<dyn WatchRegistry>,
    notifier: NotificationSender,
    candidates: RwLock<HashMap<String, DiscoveredCandidate>>,
}

impl DiscoveryEngine {
    pub fn new(
        runtime: Arc<RuntimeConfigStore>,
        ledger: Arc<Ledger>,
        analyzer: Arc<dyn AccountAnalyzer>,
        watch: Arc<dyn WatchRegistry>,
        notifier: NotificationSender,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            runtime,
            ledger,
            analyzer,
            watch,
            notifier,
            candidates: RwLock::new(HashMap::new()),
        }
    }

    pub fn start(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            let config = self.runtime.snapshot();
            info!(
                min_transfer = config.min_transfer,
                max_transfer = config.max_transfer,
                "Discovery started"
            );
        }
    }

    pub fn stop(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("Discovery stopped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Evaluate a transfer and record its recipient as a candidate if it qualifies
    pub async fn process_transfer(
        &self,
        from: &str,
        to: &str,
        amount_sol: f64,
        signature: &str,
    ) -> DiscoveryOutcome {
        if !self.is_enabled() {
            return DiscoveryOutcome::Disabled;
        }
        if !self.runtime.snapshot().in_transfer_range(amount_sol) {
            return DiscoveryOutcome::OutOfRange;
        }
        if from != self.ledger.master() && !self.ledger.is_followed(from) {
            return DiscoveryOutcome::UntrackedSource;
        }
        if self.ledger.is_followed(to) {
            debug!(address = %to, "Recipient already followed");
            return DiscoveryOutcome::AlreadyFollowed;
        }

        {
            let mut candidates = self.candidates.write();
            if candidates.contains_key(to) {
                debug!(address = %to, "Recipient already discovered");
                return DiscoveryOutcome::AlreadyCandidate;
            }
            candidates.insert(
                to.to_string(),
                DiscoveredCandidate {
                    address: to.to_string(),
                    discovered_at: Utc::now(),
                    transfer_amount: amount_sol,
                    from_account: from.to_string(),
                    notified: false,
                    ignored: false,
                    analysis: None,
                },
            );
        }
        info!(
            address = %to,
            from = %from,
            amount_sol,
            signature = %signature,
            "New wallet discovered"
        );

        let analysis = self.analyzer.analyze(to).await;

        let mut candidates = self.candidates.write();
        let Some(candidate) = candidates.get_mut(to) else {
            return DiscoveryOutcome::Suspicious;
        };
        candidate.analysis = Some(analysis.clone());

        if analysis.suspicious {
            info!(
                address = %to,
                balance_sol = analysis.balance_sol,
                tx_count = analysis.tx_count,
                "Suspicious wallet, not reporting"
            );
            candidate.notified = true;
            return DiscoveryOutcome::Suspicious;
        }
        if !self.is_enabled() {
            return DiscoveryOutcome::Disabled;
        }

        candidate.notified = true;
        drop(candidates);

        self.notifier.send(NotificationEvent::WalletDiscovered {
            address: to.to_string(),
            from: from.to_string(),
            amount_sol,
            balance_sol: analysis.balance_sol,
            tx_count: analysis.tx_count,
        });
        DiscoveryOutcome::Notified
    }

    /// Follow a candidate. Returns false if the address was never discovered.
    pub fn add_discovered_wallet(&self, address: &str) -> bool {
        if !self.candidates.read().contains_key(address) {
            info!(address = %address, "Not a discovered wallet");
            return false;
        }

        self.ledger.add_account(address, AccountCategory::Discovered);
        self.watch.add_wallet(address);
        self.notifier.send(NotificationEvent::WalletAdded {
            address: address.to_string(),
        });
        info!(address = %address, "Discovered wallet added");
        true
    }

    /// Dismiss a candidate; it stays until evicted so it is never re-proposed
    pub fn ignore_candidate(&self, address: &str) -> bool {
        match self.candidates.write().get_mut(address) {
            Some(candidate) => {
                candidate.ignored = true;
                candidate.notified = true;
                true
            }
            None => false,
        }
    }

    /// Evict candidates older than `max_age_hours`
    pub fn clear_old_discoveries(&self, max_age_hours: u64) -> usize {
        // Clamped to a century to stay inside chrono's range
        let hours = max_age_hours.min(24 * 365 * 100) as i64;
        let max_age = ChronoDuration::hours(hours);
        self.clear_discoveries_before(Utc::now() - max_age)
    }

    /// Evict candidates discovered strictly before `cutoff`
    pub fn clear_discoveries_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut candidates = self.candidates.write();
        let before = candidates.len();
        candidates.retain(|_, c| c.discovered_at >= cutoff);
        let cleared = before - candidates.len();
        if cleared > 0 {
            info!(cleared, "Old discoveries cleared");
        }
        cleared
    }

    pub fn get_candidate(&self, address: &str) -> Option<DiscoveredCandidate> {
        self.candidates.read().get(address).cloned()
    }

    /// All candidates, oldest first
    pub fn candidates(&self) -> Vec<DiscoveredCandidate> {
        let mut list: Vec<DiscoveredCandidate> = self.candidates.read().values().cloned().collect();
        list.sort_by(|a, b| a.discovered_at.cmp(&b.discovered_at));
        list
    }

    pub fn stats(&self) -> DiscoveryStats {
        let candidates = self.candidates.read();
        let total = candidates.len();
        let added = candidates
            .keys()
            .filter(|address| self.ledger.is_followed(address))
            .count();
        let avg_transfer_amount = if total > 0 {
            candidates.values().map(|c| c.transfer_amount).sum::<f64>() / total as f64
        } else {
            0.0
        };

        DiscoveryStats {
            total,
            added,
            pending: total - added,
            avg_transfer_amount,
        }
    }
}
