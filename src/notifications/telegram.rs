//! Telegram notification service and command source
//!
//! Sends alerts via Telegram Bot API with rate limiting to prevent spam, and
//! long-polls `getUpdates` for operator commands.

use super::{AlertLevel, NotificationEvent, NotificationService};
use crate::config::TelegramConfig;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Seconds Telegram holds a getUpdates request open
const LONG_POLL_SECS: u64 = 30;

/// Rate limiter for notifications
struct RateLimiter {
    /// Last sent time for each message type
    last_sent: RwLock<HashMap<String, Instant>>,
    /// Minimum interval between messages
    interval: Duration,
}

impl RateLimiter {
    fn new(interval_seconds: u64) -> Self {
        Self {
            last_sent: RwLock::new(HashMap::new()),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// Check if we can send a message of this type
    fn can_send(&self, key: &str) -> bool {
        let last_sent = self.last_sent.read();
        match last_sent.get(key) {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Mark a message type as sent
    fn mark_sent(&self, key: &str) {
        let mut last_sent = self.last_sent.write();
        last_sent.insert(key.to_string(), Instant::now());
    }

    /// Get rate limit key for an event; `None` is never limited
    fn get_key(event: &NotificationEvent) -> Option<String> {
        match event {
            NotificationEvent::TradeDetected { trade, .. } => {
                Some(format!("trade_detected:{}", trade.id))
            }
            NotificationEvent::ExecutionResult {
                trade_id, success, ..
            } => Some(format!("execution:{}:{}", trade_id, success)),
            NotificationEvent::PositionClosed { trade_id, .. } => {
                Some(format!("closed:{}", trade_id))
            }
            NotificationEvent::WalletDiscovered { address, .. } => {
                Some(format!("discovered:{}", address))
            }
            NotificationEvent::WalletAdded { address } => Some(format!("added:{}", address)),
            NotificationEvent::ListenerFailed { .. } => Some("listener_failed".to_string()),
            NotificationEvent::CommandReply { .. } | NotificationEvent::Shutdown => None,
        }
    }
}

/// Escape text for Telegram's HTML parse mode
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Telegram notification service
pub struct TelegramNotifier {
    /// Bot token
    bot_token: SecretString,
    /// Chat ID
    chat_id: String,
    /// HTTP client
    client: reqwest::Client,
    /// Whether enabled
    enabled: bool,
    /// Rate limiter
    rate_limiter: RateLimiter,
}

impl TelegramNotifier {
    /// Create a new Telegram notifier
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            bot_token: config
                .bot_token
                .clone()
                .unwrap_or_else(|| SecretString::new(String::new())),
            chat_id: config.chat_id.clone(),
            client,
            enabled: config.enabled,
            rate_limiter: RateLimiter::new(config.rate_limit_seconds),
        })
    }

    /// Send a message to Telegram
    async fn send_message(&self, text: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            TELEGRAM_API,
            self.bot_token.expose_secret()
        );

        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error: {} - {}", status, body);
        }

        Ok(())
    }

    /// Format message with level prefix
    fn format_with_level(&self, level: AlertLevel, message: &str) -> String {
        let level_prefix = match level {
            AlertLevel::Critical => "🔴 <b>CRITICAL</b>\n\n",
            AlertLevel::Important => "🟡 <b>IMPORTANT</b>\n\n",
            AlertLevel::Info => "",
        };

        format!("{}{}", level_prefix, escape_html(message))
    }
}

#[async_trait::async_trait]
impl NotificationService for TelegramNotifier {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        // Check rate limit (skip for critical alerts)
        let rate_key = RateLimiter::get_key(&event);
        if let Some(key) = &rate_key {
            if event.level() != AlertLevel::Critical && !self.rate_limiter.can_send(key) {
                tracing::debug!(key = %key, "Rate limited, skipping notification");
                return Ok(());
            }
        }

        let level = event.level();
        let message = event.format_message();
        let formatted = self.format_with_level(level, &message);

        self.send_message(&formatted).await?;
        if let Some(key) = &rate_key {
            self.rate_limiter.mark_sent(key);
        }

        tracing::debug!(level = %level, "Sent Telegram notification");

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled && !self.bot_token.expose_secret().is_empty() && !self.chat_id.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Long-polls the bot for command messages from the configured chat
pub struct TelegramCommandSource {
    bot_token: SecretString,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramCommandSource {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Telegram bot token is not configured"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()?;

        Ok(Self {
            bot_token,
            chat_id: config.chat_id.clone(),
            client,
        })
    }

    async fn fetch_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        let url = format!(
            "{}/bot{}/getUpdates",
            TELEGRAM_API,
            self.bot_token.expose_secret()
        );
        let response: UpdatesResponse = self
            .client
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECS.to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            anyhow::bail!(
                "Telegram getUpdates failed: {}",
                response.description.unwrap_or_default()
            );
        }
        Ok(response.result)
    }

    /// Forward command text from the configured chat until cancelled
    pub fn spawn(self, commands: mpsc::Sender<String>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut offset = 0i64;
            tracing::info!("Telegram command polling started");

            loop {
                let updates = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.fetch_updates(offset) => result,
                };

                let updates = match updates {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!(error = %e, "Telegram polling failed");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
                        }
                    }
                };

                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(message) = update.message else {
                        continue;
                    };
                    if message.chat.id.to_string() != self.chat_id {
                        tracing::warn!(chat_id = message.chat.id, "Ignoring message from unknown chat");
                        continue;
                    }
                    let Some(text) = message.text else {
                        continue;
                    };
                    if commands.send(text).await.is_err() {
                        tracing::info!("Command channel closed");
                        return;
                    }
                }
            }
            tracing::info!("Telegram command polling stopped");
        })
    }
}
