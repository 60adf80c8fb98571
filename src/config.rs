//! Configuration management for Mirror Operator
//!
//! Loads configuration from YAML files and environment variables.
//! Environment variables override YAML values.

use crate::models::TradeMode;
use crate::runtime_config::RuntimeConfig;
use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// TEST (paper fills) or REAL (live swaps)
    #[serde(default = "default_mode")]
    pub mode: TradeMode,
    /// Operator wallet
    pub wallet: WalletConfig,
    /// Websocket chain data feed
    pub feed: FeedConfig,
    /// HTTP RPC endpoint configuration
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Stream listener reconnection settings
    #[serde(default)]
    pub listener: ListenerConfig,
    /// Exit monitor settings
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Discovery heuristics
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Periodic housekeeping
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
    /// Persisted ledger state
    #[serde(default)]
    pub state: StateConfig,
    /// Price API configuration
    #[serde(default)]
    pub price: PriceConfig,
    /// Telegram notification and command settings
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Initial values of the mutable runtime parameters
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_mode() -> TradeMode {
    TradeMode::Test
}

/// Wallet configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Master account address (base58)
    #[serde(default)]
    pub master: String,
}

/// Chain data feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Websocket endpoint (wss://...)
    #[serde(default)]
    pub ws_url: String,
    /// Commitment level for log subscriptions
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

/// RPC endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// HTTP RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub http_url: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_ms: u64,
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_rpc_timeout() -> u64 {
    10000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            http_url: default_rpc_url(),
            timeout_ms: default_rpc_timeout(),
        }
    }
}

/// Stream listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Backoff base delay in milliseconds
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_reconnect_cap")]
    pub reconnect_cap_ms: u64,
    /// Reconnect attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Start listener and discovery on launch
    #[serde(default = "default_true")]
    pub autostart: bool,
    /// Capacity of the classified event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_reconnect_base() -> u64 {
    1000
}

fn default_reconnect_cap() -> u64 {
    30000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_event_buffer() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: default_reconnect_base(),
            reconnect_cap_ms: default_reconnect_cap(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            autostart: true,
            event_buffer: default_event_buffer(),
        }
    }
}

/// Exit monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between price checks for each active trade
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Candidates older than this are evicted
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Balance (SOL) above which a candidate is considered suspicious
    #[serde(default = "default_suspicious_balance")]
    pub suspicious_balance_sol: f64,
    /// Number of recent signatures inspected for activity
    #[serde(default = "default_activity_lookback")]
    pub activity_lookback: usize,
}

fn default_retention_hours() -> u64 {
    24
}

fn default_suspicious_balance() -> f64 {
    1000.0
}

fn default_activity_lookback() -> usize {
    10
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            suspicious_balance_sol: default_suspicious_balance(),
            activity_lookback: default_activity_lookback(),
        }
    }
}

/// Housekeeping configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HousekeepingConfig {
    #[serde(default = "default_housekeeping_interval")]
    pub interval_secs: u64,
}

fn default_housekeeping_interval() -> u64 {
    60
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_housekeeping_interval(),
        }
    }
}

/// Persistence backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    Json,
    Sqlite,
}

/// Persisted state configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_backend")]
    pub backend: StateBackend,
    /// JSON document or SQLite database path
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

fn default_state_backend() -> StateBackend {
    StateBackend::Json
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/state.json")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_state_backend(),
            path: default_state_path(),
        }
    }
}

/// Price API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    /// Jupiter price endpoint
    #[serde(default = "default_price_api_url")]
    pub api_url: String,
    /// Seconds a fetched price stays fresh
    #[serde(default = "default_price_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_price_api_url() -> String {
    "https://price.jup.ag/v6/price".to_string()
}

fn default_price_cache_ttl() -> u64 {
    3
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            api_url: default_price_api_url(),
            cache_ttl_secs: default_price_cache_ttl(),
        }
    }
}

/// Telegram configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether Telegram notifications are enabled
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (from environment: MIRROR_TELEGRAM__BOT_TOKEN)
    #[serde(default)]
    pub bot_token: Option<SecretString>,
    /// Chat ID to send notifications to and accept commands from
    #[serde(default)]
    pub chat_id: String,
    /// Rate limit in seconds between similar notifications
    #[serde(default = "default_notification_rate_limit")]
    pub rate_limit_seconds: u64,
    /// Long-poll getUpdates for chat commands
    #[serde(default = "default_true")]
    pub poll_commands: bool,
}

fn default_notification_rate_limit() -> u64 {
    60
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: String::new(),
            rate_limit_seconds: default_notification_rate_limit(),
            poll_commands: true,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// JSON lines instead of human-readable output
    #[serde(default = "default_true")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { json: true }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (MIRROR_*)
    /// 2. config/config.yaml (if exists)
    /// 3. config.yaml (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("mode", "TEST")?
            .set_default("wallet.master", "")?
            .set_default("feed.ws_url", "")?
            .set_default("feed.commitment", "confirmed")?
            .set_default("rpc.http_url", "https://api.mainnet-beta.solana.com")?
            .set_default("rpc.timeout_ms", 10000)?
            .set_default("listener.reconnect_base_ms", 1000)?
            .set_default("listener.reconnect_cap_ms", 30000)?
            .set_default("listener.max_reconnect_attempts", 10)?
            .set_default("monitor.poll_interval_secs", 5)?
            .set_default("state.backend", "json")?
            .set_default("state.path", "data/state.json")?
            // Load from config files (lower priority)
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false))
            // MIRROR_WALLET__MASTER=... -> wallet.master
            // MIRROR_RUNTIME__TRADE_SIZE=0.2 -> runtime.trade_size
            .add_source(
                Environment::with_prefix("MIRROR")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallet.master.is_empty() {
            return Err(ConfigError::Message(
                "Master wallet must be set via MIRROR_WALLET__MASTER".to_string(),
            ));
        }
        if Pubkey::from_str(&self.wallet.master).is_err() {
            return Err(ConfigError::Message(format!(
                "Master wallet is not a valid address: {}",
                self.wallet.master
            )));
        }

        if self.feed.ws_url.is_empty() {
            return Err(ConfigError::Message(
                "Feed websocket URL must be set via MIRROR_FEED__WS_URL".to_string(),
            ));
        }

        if self.listener.reconnect_base_ms > self.listener.reconnect_cap_ms {
            return Err(ConfigError::Message(
                "Reconnect base delay must not exceed the cap".to_string(),
            ));
        }
        if self.listener.max_reconnect_attempts == 0 {
            return Err(ConfigError::Message(
                "max_reconnect_attempts must be at least 1".to_string(),
            ));
        }
        if self.listener.event_buffer == 0 {
            return Err(ConfigError::Message(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.housekeeping.interval_secs == 0 {
            return Err(ConfigError::Message(
                "housekeeping interval_secs must be at least 1".to_string(),
            ));
        }

        if self.telegram.enabled
            && (self.telegram.bot_token.is_none() || self.telegram.chat_id.is_empty())
        {
            return Err(ConfigError::Message(
                "Telegram enabled but bot_token or chat_id is missing".to_string(),
            ));
        }

        self.runtime
            .validate()
            .map_err(|e| ConfigError::Message(format!("Invalid runtime defaults: {}", e)))?;

        Ok(())
    }
}
