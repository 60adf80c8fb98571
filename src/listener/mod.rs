//! Stream listener for the chain data feed
//!
//! Keeps one websocket connection open, subscribes to logs mentioning each
//! watched account, classifies notifications and forwards the resulting
//! events in delivery order.
//!
//! State machine:
//! ```text
//! STOPPED -> CONNECTING -> SUBSCRIBED -> (RECONNECTING -> CONNECTING)* -> STOPPED
//! ```
//!
//! The feed has no unsubscribe-by-address primitive: `remove_wallet` only
//! shrinks the watch set and takes effect on the next reconnect.

mod backoff;
mod classifier;

pub use backoff::Backoff;
pub use classifier::{base58_tokens, parse_lamports, parse_sol_amount, HeuristicClassifier, LogClassifier};

use crate::config::AppConfig;
use crate::ledger::Ledger;
use crate::models::ClassifiedEvent;
use crate::notifications::{NotificationEvent, NotificationSender};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Signatures remembered to drop duplicate notifications
const SEEN_SIGNATURES_LIMIT: usize = 2048;

/// Registers wallets with the feed subscription
pub trait WatchRegistry: Send + Sync {
    /// Add to the watch set; subscribes immediately when connected
    fn add_wallet(&self, address: &str);

    /// Remove from the watch set (effective on next reconnect)
    fn remove_wallet(&self, address: &str);
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Connecting,
    Subscribed,
    Reconnecting,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerState::Stopped => write!(f, "STOPPED"),
            ListenerState::Connecting => write!(f, "CONNECTING"),
            ListenerState::Subscribed => write!(f, "SUBSCRIBED"),
            ListenerState::Reconnecting => write!(f, "RECONNECTING"),
        }
    }
}

/// Feed endpoint and reconnect policy
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub ws_url: String,
    pub commitment: String,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub max_reconnect_attempts: u32,
}

impl ListenerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ws_url: config.feed.ws_url.clone(),
            commitment: config.feed.commitment.clone(),
            reconnect_base: Duration::from_millis(config.listener.reconnect_base_ms),
            reconnect_cap: Duration::from_millis(config.listener.reconnect_cap_ms),
            max_reconnect_attempts: config.listener.max_reconnect_attempts,
        }
    }
}

/// Inbound frame: either a subscription ack or a log notification
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<NotificationParams>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    result: NotificationResult,
}

#[derive(Debug, Deserialize)]
struct NotificationResult {
    value: LogsValue,
}

#[derive(Debug, Deserialize)]
struct LogsValue {
    signature: String,
    #[serde(default)]
    err: Option<serde_json::Value>,
    #[serde(default)]
    logs: Vec<String>,
}

/// Live session handle; cancelled by `stop()` or when reconnects are exhausted
struct Session {
    cancel: CancellationToken,
    subscribe_tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Subscriptions {
    /// Request id -> address, awaiting acknowledgement
    pending: HashMap<u64, String>,
    /// Subscription id -> address
    active: HashMap<u64, String>,
}

/// Bounded memory of recently seen signatures
#[derive(Default)]
struct SeenSignatures {
    set: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenSignatures {
    /// Returns false if the signature was already seen
    fn insert(&mut self, signature: &str) -> bool {
        if self.set.contains(signature) {
            return false;
        }
        if self.order.len() >= SEEN_SIGNATURES_LIMIT {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.set.insert(signature.to_string());
        self.order.push_back(signature.to_string());
        true
    }
}

/// Websocket log subscriber
pub struct StreamListener {
    settings: ListenerSettings,
    ledger: Arc<Ledger>,
    classifier: Arc<dyn LogClassifier>,
    events: mpsc::Sender<ClassifiedEvent>,
    notifier: NotificationSender,
    watched: RwLock<BTreeSet<String>>,
    state: RwLock<ListenerState>,
    session: Mutex<Option<Session>>,
    subscriptions: Mutex<Subscriptions>,
    seen: Mutex<SeenSignatures>,
    request_id: AtomicU64,
}

impl StreamListener {
    pub fn new(
        settings: ListenerSettings,
        ledger: Arc<Ledger>,
        classifier: Arc<dyn LogClassifier>,
        events: mpsc::Sender<ClassifiedEvent>,
        notifier: NotificationSender,
    ) -> Self {
        let mut watched = BTreeSet::new();
        watched.insert(ledger.master().to_string());
        Self {
            settings,
            ledger,
            classifier,
            events,
            notifier,
            watched: RwLock::new(watched),
            state: RwLock::new(ListenerState::Stopped),
            session: Mutex::new(None),
            subscriptions: Mutex::new(Subscriptions::default()),
            seen: Mutex::new(SeenSignatures::default()),
            request_id: AtomicU64::new(0),
        }
    }

    /// Begin a session. Returns false if one is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut session = self.session.lock();
        if let Some(current) = session.as_ref() {
            if !current.cancel.is_cancelled() {
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        *session = Some(Session {
            cancel: cancel.clone(),
            subscribe_tx,
        });
        drop(session);

        info!(url = %self.settings.ws_url, "Starting stream listener");
        let listener = Arc::clone(self);
        tokio::spawn(async move {
            listener.run(cancel, subscribe_rx).await;
        });
        true
    }

    /// End the current session; safe to call at any time
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().take() {
            session.cancel.cancel();
            info!("Stream listener stopped");
        }
        *self.state.write() = ListenerState::Stopped;
        let mut subs = self.subscriptions.lock();
        subs.pending.clear();
        subs.active.clear();
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|s| !s.cancel.is_cancelled())
            .unwrap_or(false)
    }

    pub fn state(&self) -> ListenerState {
        *self.state.read()
    }

    pub fn watched_wallets(&self) -> Vec<String> {
        self.watched.read().iter().cloned().collect()
    }

    /// Acknowledged subscriptions in the current connection
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().active.len()
    }

    fn set_state(&self, cancel: &CancellationToken, state: ListenerState) {
        if !cancel.is_cancelled() {
            *self.state.write() = state;
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken, mut subscribe_rx: mpsc::UnboundedReceiver<String>) {
        let mut backoff = Backoff::new(
            self.settings.reconnect_base,
            self.settings.reconnect_cap,
            self.settings.max_reconnect_attempts,
        );

        loop {
            self.set_state(&cancel, ListenerState::Connecting);
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = connect_async(self.settings.ws_url.as_str()) => result,
            };

            match connected {
                Ok((stream, _response)) => {
                    backoff.reset();
                    info!(url = %self.settings.ws_url, "Feed connected");
                    if let Err(e) = self.run_connection(stream, &cancel, &mut subscribe_rx).await {
                        warn!(error = %e, "Feed connection error");
                    }
                }
                Err(e) => warn!(error = %e, "Feed connect failed"),
            }

            if cancel.is_cancelled() {
                break;
            }
            {
                let mut subs = self.subscriptions.lock();
                subs.pending.clear();
                subs.active.clear();
            }

            match backoff.next_delay() {
                Some(delay) => {
                    self.set_state(&cancel, ListenerState::Reconnecting);
                    info!(
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling feed reconnect"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    error!(
                        attempts = backoff.max_attempts(),
                        "Feed reconnect attempts exhausted, giving up"
                    );
                    *self.state.write() = ListenerState::Stopped;
                    cancel.cancel();
                    self.notifier.send(NotificationEvent::ListenerFailed {
                        attempts: backoff.max_attempts(),
                    });
                    break;
                }
            }
        }
        debug!("Listener session ended");
    }

    /// Drive one open connection until it closes or the session is cancelled
    async fn run_connection(
        &self,
        stream: FeedStream,
        cancel: &CancellationToken,
        subscribe_rx: &mut mpsc::UnboundedReceiver<String>,
    ) -> anyhow::Result<()> {
        let (mut write, mut read) = stream.split();

        let watch_set = self.rederive_watch_set();
        for address in &watch_set {
            write.send(Message::Text(self.subscribe_frame(address))).await?;
        }
        self.set_state(cancel, ListenerState::Subscribed);
        info!(wallets = watch_set.len(), "Subscriptions sent");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(address) = subscribe_rx.recv() => {
                    write.send(Message::Text(self.subscribe_frame(&address))).await?;
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_message(&text, cancel).await,
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!(?frame, "Feed closed by server");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        warn!("Feed stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Ledger's active accounts plus the master account
    fn rederive_watch_set(&self) -> Vec<String> {
        let mut set: BTreeSet<String> = self.ledger.active_accounts().into_iter().collect();
        set.insert(self.ledger.master().to_string());
        let list: Vec<String> = set.iter().cloned().collect();
        *self.watched.write() = set;
        list
    }

    fn subscribe_frame(&self, address: &str) -> String {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.subscriptions
            .lock()
            .pending
            .insert(id, address.to_string());
        debug!(request_id = id, address = %address, "Subscribing");

        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "logsSubscribe",
            "params": [
                {"mentions": [address]},
                {"commitment": self.settings.commitment}
            ]
        })
        .to_string()
    }

    async fn handle_message(&self, text: &str, cancel: &CancellationToken) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed feed frame");
                return;
            }
        };

        match (frame.method.as_deref(), frame.id) {
            (None, Some(request_id)) => {
                let Some(subscription_id) = frame.result.as_ref().and_then(|v| v.as_u64()) else {
                    warn!(request_id, "Subscription request rejected");
                    return;
                };
                let mut subs = self.subscriptions.lock();
                if let Some(address) = subs.pending.remove(&request_id) {
                    debug!(subscription_id, address = %address, "Subscription confirmed");
                    subs.active.insert(subscription_id, address);
                }
            }
            (Some("logsNotification"), _) => {
                let Some(params) = frame.params else {
                    warn!("Dropping log notification without params");
                    return;
                };
                let value = params.result.value;
                if value.err.as_ref().is_some_and(|e| !e.is_null()) {
                    debug!(signature = %value.signature, "Skipping failed transaction");
                    return;
                }
                if !self.seen.lock().insert(&value.signature) {
                    debug!(signature = %value.signature, "Duplicate notification");
                    return;
                }

                let Some(event) = self.classifier.classify(&value.logs, &value.signature) else {
                    return;
                };
                if cancel.is_cancelled() {
                    return;
                }
                info!(signature = %value.signature, kind = event.kind(), "Event classified");
                if self.events.send(event).await.is_err() {
                    warn!("Event router gone, dropping event");
                }
            }
            _ => debug!("Ignoring unrecognized feed frame"),
        }
    }
}

impl WatchRegistry for StreamListener {
    fn add_wallet(&self, address: &str) {
        if !self.watched.write().insert(address.to_string()) {
            return;
        }
        info!(address = %address, "Wallet added to watch set");
        if self.state() == ListenerState::Subscribed {
            if let Some(session) = self.session.lock().as_ref() {
                let _ = session.subscribe_tx.send(address.to_string());
            }
        }
    }

    fn remove_wallet(&self, address: &str) {
        if self.watched.write().remove(address) {
            info!(address = %address, "Wallet removed from watch set");
        }
    }
}
