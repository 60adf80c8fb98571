//! Stream Listener Integration Tests
//!
//! Runs the listener against an in-process websocket feed.

use super::support::*;
use futures_util::{SinkExt, StreamExt};
use mirror_operator::listener::{
    HeuristicClassifier, ListenerSettings, ListenerState, StreamListener, WatchRegistry,
};
use mirror_operator::models::{AccountCategory, ClassifiedEvent, TradeDirection};
use mirror_operator::notifications::{NotificationEvent, NotificationSender};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

enum Outbound {
    Text(String),
    Close,
}

/// Feed stand-in: records client frames, sends whatever the test queues
struct FeedServer {
    url: String,
    frames: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl FeedServer {
    async fn start() -> Self {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", tcp.local_addr().unwrap());
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        tokio::spawn(async move {
            while let Ok((stream, _)) = tcp.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();
                loop {
                    tokio::select! {
                        message = read.next() => match message {
                            Some(Ok(Message::Text(text))) => {
                                let _ = frames_tx.send(serde_json::from_str::<Value>(&text).unwrap());
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                        out = outbound_rx.recv() => match out {
                            Some(Outbound::Text(text)) => {
                                if write.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Outbound::Close) => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            url,
            frames,
            outbound,
        }
    }

    async fn next_frame(&mut self) -> Value {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("frame in time")
            .expect("server alive")
    }

    fn send(&self, value: Value) {
        let _ = self.outbound.send(Outbound::Text(value.to_string()));
    }

    fn send_raw(&self, text: &str) {
        let _ = self.outbound.send(Outbound::Text(text.to_string()));
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Acknowledge a subscribe request, returning the address it asked for
    fn ack(&self, frame: &Value, subscription: u64) -> String {
        assert_eq!(frame["method"], "logsSubscribe");
        self.send(json!({"jsonrpc": "2.0", "result": subscription, "id": frame["id"]}));
        frame["params"][0]["mentions"][0].as_str().unwrap().to_string()
    }
}

fn settings(url: &str, max_attempts: u32) -> ListenerSettings {
    ListenerSettings {
        ws_url: url.to_string(),
        commitment: "confirmed".to_string(),
        reconnect_base: Duration::from_millis(5),
        reconnect_cap: Duration::from_millis(20),
        max_reconnect_attempts: max_attempts,
    }
}

fn notification(signature: &str, err: Value, logs: &[String]) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "logsNotification",
        "params": {
            "result": {
                "context": {"slot": 250_000_000u64},
                "value": {"signature": signature, "err": err, "logs": logs}
            },
            "subscription": 100
        }
    })
}

fn transfer_logs() -> Vec<String> {
    vec![
        "Program 11111111111111111111111111111111 invoke [1]".to_string(),
        format!("Transfer: from: {} to: {} 2000000000 lamports", MASTER, NEW_WALLET),
        "Program 11111111111111111111111111111111 success".to_string(),
    ]
}

fn swap_logs() -> Vec<String> {
    vec![
        "Program log: Instruction: Swap".to_string(),
        "Program log: from: wsol".to_string(),
        format!("Program log: to: {}", BONK),
    ]
}

fn listener(
    url: &str,
    max_attempts: u32,
    ledger: Arc<mirror_operator::ledger::Ledger>,
    notifier: NotificationSender,
) -> (Arc<StreamListener>, mpsc::Receiver<ClassifiedEvent>) {
    let (events_tx, events_rx) = mpsc::channel(16);
    let classifier = Arc::new(HeuristicClassifier::new(MASTER, runtime()));
    let listener = Arc::new(StreamListener::new(
        settings(url, max_attempts),
        ledger,
        classifier,
        events_tx,
        notifier,
    ));
    (listener, events_rx)
}

#[tokio::test]
async fn test_subscribe_classify_and_forward() {
    let mut server = FeedServer::start().await;
    let ledger = ledger();
    ledger.add_account(FRIEND, AccountCategory::Followed);
    let (notifier, _notifications) = notifier();
    let (listener, mut events) = listener(&server.url, 3, ledger, notifier);

    assert!(listener.start());
    assert!(!listener.start(), "start is idempotent");

    let mut subscribed = Vec::new();
    for subscription in 1..=2u64 {
        let frame = server.next_frame().await;
        assert_eq!(frame["params"][1]["commitment"], "confirmed");
        subscribed.push(server.ack(&frame, subscription));
    }
    subscribed.sort();
    let mut expected = vec![MASTER.to_string(), FRIEND.to_string()];
    expected.sort();
    assert_eq!(subscribed, expected);

    assert!(eventually(WAIT, || listener.subscription_count() == 2).await);
    assert_eq!(listener.state(), ListenerState::Subscribed);

    server.send(notification("s1", Value::Null, &transfer_logs()));
    server.send(notification("s1", Value::Null, &transfer_logs()));
    server.send(notification("s2", json!({"InstructionError": [0, "Custom"]}), &swap_logs()));
    server.send_raw("not json");
    server.send(notification("s3", Value::Null, &["Program log: nothing here".to_string()]));
    server.send(notification("s4", Value::Null, &swap_logs()));

    let first = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(
        first,
        ClassifiedEvent::Transfer {
            from: MASTER.to_string(),
            to: NEW_WALLET.to_string(),
            amount_sol: 2.0,
            signature: "s1".to_string(),
        }
    );
    let second = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    match second {
        ClassifiedEvent::Swap { direction, asset_id, signature, .. } => {
            assert_eq!(direction, TradeDirection::Buy);
            assert_eq!(asset_id.as_deref(), Some(BONK));
            assert_eq!(signature, "s4");
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Wallets added while connected subscribe right away
    listener.add_wallet(NEW_WALLET);
    let frame = server.next_frame().await;
    assert_eq!(server.ack(&frame, 3), NEW_WALLET);
    assert!(listener.watched_wallets().contains(&NEW_WALLET.to_string()));

    listener.stop();
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert!(!listener.is_running());
    assert_eq!(listener.subscription_count(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_resubscribes_after_server_close() {
    let mut server = FeedServer::start().await;
    let ledger = ledger();
    let (notifier, _notifications) = notifier();
    let (listener, _events) = listener(&server.url, 5, ledger.clone(), notifier);

    listener.start();
    let frame = server.next_frame().await;
    assert_eq!(server.ack(&frame, 1), MASTER);

    // Followed while disconnected: picked up from the ledger on reconnect
    ledger.add_account(FRIEND, AccountCategory::Followed);
    server.close();

    let mut resubscribed = Vec::new();
    for subscription in 2..=3u64 {
        let frame = server.next_frame().await;
        resubscribed.push(server.ack(&frame, subscription));
    }
    assert!(resubscribed.contains(&MASTER.to_string()));
    assert!(resubscribed.contains(&FRIEND.to_string()));
    assert!(eventually(WAIT, || listener.subscription_count() == 2).await);
    assert!(listener.is_running());

    listener.stop();
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    // Bind then drop to get a port nothing listens on
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let url = format!("ws://127.0.0.1:{}", port);
    let (notifier, mut notifications) = notifier();
    let (listener, _events) = listener(&url, 2, ledger(), notifier);

    assert!(listener.start());
    let event = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert!(matches!(event, NotificationEvent::ListenerFailed { attempts: 2 }));
    assert!(!listener.is_running());
    assert_eq!(listener.state(), ListenerState::Stopped);

    // A new session can be started after giving up
    assert!(listener.start());
    listener.stop();
}
