//! Lightweight risk check for candidate wallets

use crate::config::DiscoveryConfig;
use crate::error::{AppError, AppResult};
use crate::utils::lamports_to_sol;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

/// Balance and recent activity of a wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountAnalysis {
    pub balance_sol: f64,
    /// Signatures found within the lookback window
    pub tx_count: usize,
    pub is_active: bool,
    pub suspicious: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

impl AccountAnalysis {
    /// Apply the suspicion rule: a very large balance or no recent activity
    pub fn evaluate(
        balance_sol: f64,
        tx_count: usize,
        last_activity: Option<DateTime<Utc>>,
        suspicious_balance_sol: f64,
    ) -> Self {
        Self {
            balance_sol,
            tx_count,
            is_active: tx_count > 0,
            suspicious: balance_sol > suspicious_balance_sol || tx_count == 0,
            last_activity,
        }
    }
}

/// Looks up a wallet's on-chain profile
#[async_trait]
pub trait AccountAnalyzer: Send + Sync {
    /// Never fails; lookup errors yield a non-suspicious empty analysis
    async fn analyze(&self, address: &str) -> AccountAnalysis;
}

/// Analyzer backed by the HTTP RPC endpoint
pub struct RpcAccountAnalyzer {
    client: RpcClient,
    suspicious_balance_sol: f64,
    activity_lookback: usize,
}

impl RpcAccountAnalyzer {
    pub fn new(rpc_url: &str, timeout: Duration, config: &DiscoveryConfig) -> Self {
        Self {
            client: RpcClient::new_with_timeout(rpc_url.to_string(), timeout),
            suspicious_balance_sol: config.suspicious_balance_sol,
            activity_lookback: config.activity_lookback,
        }
    }

    async fn try_analyze(&self, address: &str) -> AppResult<AccountAnalysis> {
        let pubkey = Pubkey::from_str(address)
            .map_err(|e| AppError::Validation(format!("Invalid address {}: {}", address, e)))?;

        let lamports = self
            .client
            .get_balance(&pubkey)
            .await
            .map_err(|e| AppError::Rpc(e.to_string()))?;

        let signatures = self
            .client
            .get_signatures_for_address_with_config(
                &pubkey,
                GetConfirmedSignaturesForAddress2Config {
                    before: None,
                    until: None,
                    limit: Some(self.activity_lookback),
                    commitment: None,
                },
            )
            .await
            .map_err(|e| AppError::Rpc(e.to_string()))?;

        let last_activity = signatures
            .first()
            .and_then(|s| s.block_time)
            .and_then(|t| Utc.timestamp_opt(t, 0).single());

        Ok(AccountAnalysis::evaluate(
            lamports_to_sol(lamports),
            signatures.len(),
            last_activity,
            self.suspicious_balance_sol,
        ))
    }
}

#[async_trait]
impl AccountAnalyzer for RpcAccountAnalyzer {
    async fn analyze(&self, address: &str) -> AccountAnalysis {
        match self.try_analyze(address).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Wallet analysis failed");
                AccountAnalysis::default()
            }
        }
    }
}
