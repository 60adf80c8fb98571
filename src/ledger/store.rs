//! Ledger persistence
//!
//! The store is a plain get/put of the whole snapshot. Failures are logged
//! and swallowed: the in-memory ledger stays authoritative.

use super::{Ledger, LedgerSnapshot};
use crate::error::AppResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot storage backend
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the last saved snapshot, if any
    async fn load(&self) -> AppResult<Option<LedgerSnapshot>>;

    /// Replace the saved snapshot
    async fn save(&self, snapshot: &LedgerSnapshot) -> AppResult<()>;
}

/// Pretty-printed JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> AppResult<Option<LedgerSnapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = ?self.path, "No saved state, starting fresh");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: LedgerSnapshot = serde_json::from_slice(&raw)?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(snapshot)?;

        // Write-then-rename so a crash never leaves a truncated document
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = ?self.path,
            accounts = snapshot.accounts.len(),
            trades = snapshot.trades.len(),
            "State saved"
        );
        Ok(())
    }
}

/// Save the current ledger snapshot, logging instead of failing
pub async fn flush(ledger: &Ledger, store: &dyn StateStore) -> bool {
    match store.save(&ledger.snapshot()).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Failed to persist ledger state");
            false
        }
    }
}

/// Save after every ledger mutation until cancelled.
///
/// Bursts of mutations coalesce into one save of the latest snapshot.
pub fn spawn_persistence_writer(
    ledger: Arc<Ledger>,
    store: Arc<dyn StateStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Persistence writer started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ledger.changed() => {
                    flush(&ledger, store.as_ref()).await;
                }
            }
        }
        info!("Persistence writer stopped");
    })
}
