//! Event router: dispatches classified events in delivery order

use super::copy::{CopyEngine, DetectedSwap};
use crate::discovery::DiscoveryEngine;
use crate::models::ClassifiedEvent;
use crate::runtime_config::RuntimeConfigStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sends transfers to discovery and swaps to the copy engine
pub struct EventRouter {
    runtime: Arc<RuntimeConfigStore>,
    discovery: Arc<DiscoveryEngine>,
    copy: Arc<CopyEngine>,
}

impl EventRouter {
    pub fn new(
        runtime: Arc<RuntimeConfigStore>,
        discovery: Arc<DiscoveryEngine>,
        copy: Arc<CopyEngine>,
    ) -> Self {
        Self {
            runtime,
            discovery,
            copy,
        }
    }

    pub async fn route(&self, event: ClassifiedEvent) {
        match event {
            ClassifiedEvent::Transfer {
                from,
                to,
                amount_sol,
                signature,
            } => {
                if !self.runtime.snapshot().discovery_enabled {
                    debug!(signature = %signature, "Discovery disabled, transfer ignored");
                    return;
                }
                let outcome = self
                    .discovery
                    .process_transfer(&from, &to, amount_sol, &signature)
                    .await;
                debug!(signature = %signature, ?outcome, "Transfer processed");
            }
            ClassifiedEvent::Swap {
                direction,
                source_account,
                asset_id,
                signature,
                ..
            } => {
                self.copy
                    .on_swap_event(DetectedSwap {
                        direction,
                        source_account,
                        asset_id,
                        signature,
                    })
                    .await;
            }
        }
    }

    /// Consume events one at a time until the channel closes or cancellation
    pub fn spawn(
        self,
        mut events: mpsc::Receiver<ClassifiedEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Event router started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => self.route(event).await,
                        None => break,
                    },
                }
            }
            info!("Event router stopped");
        })
    }
}
