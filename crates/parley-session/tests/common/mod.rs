//! Scripted in-memory STOMP broker for integration tests.
//!
//! Speaks just enough of the server side: CONNECTED or ERROR depending on
//! the bearer token, SUBSCRIBE bookkeeping, and SEND echoed back as MESSAGE
//! on the room topic. Tests drive link failures and third-party messages
//! through [`Broker`] methods.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use parley_core::{AuthToken, RoomId, UserId};
use parley_session::frame::{self, Command, Frame};
use parley_session::{ChatClient, SessionEngine};
use parley_settings::{ParleySettings, ReconcilePolicy, ReconnectPolicy};
use parley_transport::{MemoryConnector, MemoryPeer, MemoryServer};
use serde_json::{Value, json};
use tokio::sync::broadcast;

pub const ENDPOINT: &str = "memory://chat";
pub const GOOD_TOKEN: &str = "valid-token";

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub valid_tokens: Vec<String>,
    /// `heart-beat` header on CONNECTED.
    pub heart_beat: (u64, u64),
    /// Echo SEND back to the room topic.
    pub echo: bool,
    /// Copy `clientNonce` into echoed messages.
    pub echo_nonce: bool,
    /// Reply to CONNECT at all. `false` leaves the client waiting.
    pub answer_connect: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            valid_tokens: vec![GOOD_TOKEN.to_string()],
            heart_beat: (0, 0),
            echo: true,
            echo_nonce: true,
            answer_connect: true,
        }
    }
}

#[derive(Clone, Debug)]
enum Control {
    Close(String),
    Publish { destination: String, body: String },
    Wire(Bytes),
}

#[derive(Default)]
pub struct BrokerState {
    pub connects: usize,
    pub commands: Vec<Command>,
    /// Live subscriptions of the current link, by subscription id.
    pub subscriptions: BTreeMap<String, String>,
    pub sends: Vec<Value>,
    pub disconnects: usize,
    /// Bare EOL heart-beats received.
    pub heartbeats: usize,
}

#[derive(Clone)]
pub struct Broker {
    config: BrokerConfig,
    state: Arc<Mutex<BrokerState>>,
    control: broadcast::Sender<Control>,
}

impl Broker {
    /// Start a broker and return it with the connector clients should use.
    pub fn start(config: BrokerConfig) -> (Self, MemoryConnector) {
        let (connector, server) = MemoryConnector::pair();
        let (control, _) = broadcast::channel(64);
        let broker = Self {
            config,
            state: Arc::new(Mutex::new(BrokerState::default())),
            control,
        };
        drop(tokio::spawn(broker.clone().accept_loop(server)));
        (broker, connector)
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    pub fn sends(&self) -> Vec<Value> {
        self.state.lock().sends.clone()
    }

    /// Destinations subscribed on the current link, sorted.
    pub fn subscribed(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.lock().subscriptions.values().cloned().collect();
        topics.sort();
        topics
    }

    /// Close the live link from the server side.
    pub fn drop_link(&self, reason: &str) {
        let _ = self.control.send(Control::Close(reason.to_string()));
    }

    /// Publish a raw body on `destination` to every subscriber.
    pub fn publish_raw(&self, destination: &str, body: impl Into<String>) {
        let _ = self.control.send(Control::Publish {
            destination: destination.to_string(),
            body: body.into(),
        });
    }

    /// Push raw wire bytes to every live link.
    pub fn push_wire(&self, data: impl Into<Bytes>) {
        let _ = self.control.send(Control::Wire(data.into()));
    }

    /// Publish a chat message from `sender` in `room`.
    pub fn publish_chat(&self, room: &str, sender: &str, content: &str) {
        let body = json!({
            "type": "CHAT",
            "sender": sender,
            "content": content,
            "timestamp": "2025-03-01T10:15:30",
        });
        self.publish_raw(&format!("/topic/room/{room}"), body.to_string());
    }

    /// Poll until `check` holds. Panics after roughly five seconds.
    pub async fn wait_for(&self, what: &str, check: impl Fn(&BrokerState) -> bool) {
        for _ in 0..500 {
            if check(&self.state.lock()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("broker never reached: {what}");
    }

    async fn accept_loop(self, mut server: MemoryServer) {
        while let Some(peer) = server.accept().await {
            let control = self.control.subscribe();
            drop(tokio::spawn(self.clone().serve(peer, control)));
        }
    }

    async fn serve(self, mut peer: MemoryPeer, mut control: broadcast::Receiver<Control>) {
        self.state.lock().subscriptions.clear();
        let mut message_id = 0u64;
        loop {
            tokio::select! {
                data = peer.recv() => {
                    let Some(data) = data else { return };
                    let Ok(frames) = frame::decode(&data) else { continue };
                    if frames.is_empty() {
                        self.state.lock().heartbeats += 1;
                    }
                    for frame in frames {
                        if !self.on_client_frame(&peer, frame, &mut message_id).await {
                            peer.close("broker closed after ERROR").await;
                            return;
                        }
                    }
                }
                cmd = control.recv() => match cmd {
                    Ok(Control::Close(reason)) => {
                        peer.close(&reason).await;
                        return;
                    }
                    Ok(Control::Publish { destination, body }) => {
                        self.deliver(&peer, &destination, body, &mut message_id).await;
                    }
                    Ok(Control::Wire(data)) => {
                        let _ = peer.push(data).await;
                    }
                    Err(_) => return,
                },
            }
        }
    }

    /// Handle one client frame. `false` means the link must close.
    async fn on_client_frame(&self, peer: &MemoryPeer, frame: Frame, message_id: &mut u64) -> bool {
        self.state.lock().commands.push(frame.command);
        match frame.command {
            Command::Connect | Command::Stomp => {
                self.state.lock().connects += 1;
                if !self.config.answer_connect {
                    return true;
                }
                let token = frame
                    .get("Authorization")
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .unwrap_or_default();
                if self.config.valid_tokens.iter().any(|t| t == token) {
                    let (sx, sy) = self.config.heart_beat;
                    let reply = Frame::new(Command::Connected)
                        .header("version", "1.2")
                        .header("heart-beat", format!("{sx},{sy}"));
                    let _ = peer.push(reply.encode()).await;
                    true
                } else {
                    let reply = Frame::new(Command::Error)
                        .header("message", "Invalid token")
                        .body("Authentication failed");
                    let _ = peer.push(reply.encode()).await;
                    false
                }
            }
            Command::Subscribe => {
                if let (Some(id), Some(dest)) = (frame.get("id"), frame.get("destination")) {
                    let _ = self
                        .state
                        .lock()
                        .subscriptions
                        .insert(id.to_string(), dest.to_string());
                }
                true
            }
            Command::Unsubscribe => {
                if let Some(id) = frame.get("id") {
                    let _ = self.state.lock().subscriptions.remove(id);
                }
                true
            }
            Command::Send => {
                let Ok(payload) = serde_json::from_slice::<Value>(&frame.body) else {
                    return true;
                };
                self.state.lock().sends.push(payload.clone());
                if self.config.echo {
                    let room = &payload["chatRoomId"];
                    let room = room.as_str().map_or_else(|| room.to_string(), str::to_string);
                    let mut echo = json!({
                        "type": "CHAT",
                        "sender": payload["senderId"],
                        "content": payload["message"],
                        "timestamp": "2025-03-01T10:15:30",
                    });
                    if self.config.echo_nonce {
                        echo["clientNonce"] = payload["clientNonce"].clone();
                    }
                    self.deliver(peer, &format!("/topic/room/{room}"), echo.to_string(), message_id)
                        .await;
                }
                true
            }
            Command::Disconnect => {
                self.state.lock().disconnects += 1;
                true
            }
            _ => true,
        }
    }

    async fn deliver(&self, peer: &MemoryPeer, destination: &str, body: String, message_id: &mut u64) {
        let subscription = self
            .state
            .lock()
            .subscriptions
            .iter()
            .find(|(_, dest)| dest.as_str() == destination)
            .map(|(id, _)| id.clone());
        let Some(subscription) = subscription else {
            return;
        };
        *message_id += 1;
        let message = Frame::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", message_id.to_string())
            .header("content-type", "application/json")
            .body(body);
        let _ = peer.push(message.encode()).await;
    }
}

/// Settings pointed at the broker with a fast, bounded retry policy.
pub fn settings() -> ParleySettings {
    let mut settings = ParleySettings::default();
    settings.connection.endpoint = ENDPOINT.to_string();
    settings.reconnect = ReconnectPolicy::fixed(Duration::from_millis(50), 3);
    settings
}

pub fn client(connector: &MemoryConnector, user: &str, token: Option<&str>) -> ChatClient {
    client_with(&settings(), connector, user, token)
}

pub fn client_with(
    settings: &ParleySettings,
    connector: &MemoryConnector,
    user: &str,
    token: Option<&str>,
) -> ChatClient {
    ChatClient::new(
        settings,
        Arc::new(connector.clone()),
        UserId::from(user),
        token.map(AuthToken::new),
    )
}

pub fn nonce_settings() -> ParleySettings {
    let mut settings = settings();
    settings.reconcile.policy = ReconcilePolicy::ClientNonce;
    settings
}

pub fn room(id: &str) -> RoomId {
    RoomId::from(id)
}

/// Wait until the engine reports `Connected`.
pub async fn wait_connected(engine: &SessionEngine) {
    let mut state = engine.watch_state();
    let _ = tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.is_connected()),
    )
    .await
    .expect("engine never reconnected");
}
