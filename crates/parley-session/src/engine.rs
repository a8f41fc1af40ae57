//! Session protocol engine.
//!
//! One actor task owns the connection state, the transport link, the
//! subscription registry and every timer. Callers talk to it through the
//! cloneable [`SessionEngine`] handle, and each request is a command on an
//! mpsc queue. Transport events, heart-beat ticks, the connect deadline and
//! the reconnect timer are multiplexed with those commands in a single
//! `tokio::select!` loop, so no two state transitions ever overlap.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──CONNECTED──▶ Connected
//!                             │   ▲                     │
//!                     failure │   │ timer          loss │
//!                             ▼   │                     ▼
//!           Failed ◀──exhausted── Reconnecting ◀────────┘
//! ```

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use parley_core::{
    AuthToken, ConnectionState, InboundFrame, OutboundEnvelope, ReconnectPolicy, SessionError,
    SubscriptionId, TopicPath, TopicScheme, TransportError,
};
use parley_settings::{HeartbeatSettings, ParleySettings};
use parley_transport::{ConnectionHandle, Connector, Link, TransportEvent};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, instrument, trace, warn};

use crate::frame::{self, Command, Frame};
use crate::heartbeat::{self, HeartbeatCheck, HeartbeatMonitor};
use crate::registry::{Delivery, FrameHandler, SubscriptionRegistry};

type Result<T> = std::result::Result<T, SessionError>;
type Reply<T> = oneshot::Sender<T>;

/// Capacity of the transition broadcast.
const TRANSITION_BUFFER: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Engine tuning, usually derived from [`ParleySettings`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Heart-beat offer and tolerance.
    pub heartbeat: HeartbeatSettings,
    /// Retry policy after recoverable failures.
    pub reconnect: ReconnectPolicy,
    /// Deadline for socket open plus CONNECTED.
    pub connect_timeout: Duration,
    /// Command queue capacity.
    pub command_buffer: usize,
    /// Topic naming, for the SEND destination.
    pub topics: TopicScheme,
}

impl EngineConfig {
    /// Build from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &ParleySettings) -> Self {
        Self {
            heartbeat: settings.heartbeat.clone(),
            reconnect: settings.reconnect.clone(),
            connect_timeout: settings.connection.connect_timeout(),
            command_buffer: settings.connection.command_buffer.max(1),
            topics: settings.topics.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&ParleySettings::default())
    }
}

/// One observed state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTransition {
    /// State before.
    pub from: ConnectionState,
    /// State after.
    pub to: ConnectionState,
    /// Failure that caused it, if any.
    pub cause: Option<SessionError>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

enum EngineCommand {
    Connect {
        endpoint: String,
        token: AuthToken,
        reply: Reply<Result<()>>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Subscribe {
        topic: TopicPath,
        handler: FrameHandler,
        reply: Reply<Result<SubscriptionId>>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: Reply<()>,
    },
    UnsubscribeTopic {
        topic: TopicPath,
        reply: Reply<()>,
    },
    Send {
        envelope: OutboundEnvelope,
        reply: Reply<Result<()>>,
    },
    ActiveTopics {
        reply: Reply<Vec<TopicPath>>,
    },
}

/// Cloneable handle to the engine actor.
///
/// The actor disconnects and exits once every handle is dropped.
#[derive(Clone)]
pub struct SessionEngine {
    cmd_tx: mpsc::Sender<EngineCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    transitions: broadcast::Sender<StateTransition>,
}

impl SessionEngine {
    /// Spawn the actor on the current runtime.
    pub fn spawn(config: EngineConfig, connector: Arc<dyn Connector>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);

        let actor = EngineActor {
            monitor: HeartbeatMonitor::new(config.heartbeat.max_missed),
            config,
            connector,
            cmd_rx,
            state: ConnectionState::Disconnected,
            state_tx,
            transitions: transitions.clone(),
            registry: SubscriptionRegistry::new(),
            target: None,
            waiters: Vec::new(),
            attempt: 0,
            opening: None,
            link: None,
            deadline: None,
            reconnect_at: None,
            send_beat: None,
            check_beat: None,
        };
        drop(tokio::spawn(actor.run()));

        Self {
            cmd_tx,
            state_rx,
            transitions,
        }
    }

    /// Connect to `endpoint` with `token`.
    ///
    /// Resolves once the session is `Connected`, or with the final error once
    /// it lands in `Failed`. A missing or blank token fails immediately with
    /// [`SessionError::MissingCredential`] and touches nothing.
    pub async fn connect(&self, endpoint: &str, token: Option<&AuthToken>) -> Result<()> {
        let token = match token {
            Some(token) if !token.is_blank() => token.clone(),
            _ => return Err(SessionError::MissingCredential),
        };
        let (reply, rx) = oneshot::channel();
        self.request(
            EngineCommand::Connect {
                endpoint: endpoint.to_string(),
                token,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Tear the session down. Always succeeds.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        let _ = self.request(EngineCommand::Disconnect { reply }, rx).await;
    }

    /// Register `handler` for `topic`, replacing any previous handler.
    ///
    /// Fails with `NotConnected` while `Disconnected` or `Failed`. While a
    /// connection is pending the SUBSCRIBE goes out on CONNECTED.
    pub async fn subscribe(&self, topic: TopicPath, handler: FrameHandler) -> Result<SubscriptionId> {
        let (reply, rx) = oneshot::channel();
        self.request(
            EngineCommand::Subscribe {
                topic,
                handler,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Drop subscription `id`. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        let (reply, rx) = oneshot::channel();
        let _ = self.request(EngineCommand::Unsubscribe { id, reply }, rx).await;
    }

    /// Drop whatever subscription holds `topic`.
    pub async fn unsubscribe_topic(&self, topic: TopicPath) {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .request(EngineCommand::UnsubscribeTopic { topic, reply }, rx)
            .await;
    }

    /// Publish `envelope`. Fire-and-forget; only rejected when not connected.
    pub async fn send(&self, envelope: OutboundEnvelope) -> Result<()> {
        if !self.state().is_connected() {
            return Err(SessionError::NotConnected);
        }
        let (reply, rx) = oneshot::channel();
        self.request(EngineCommand::Send { envelope, reply }, rx)
            .await?
    }

    /// Topics currently registered.
    pub async fn active_topics(&self) -> Vec<TopicPath> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineCommand::ActiveTopics { reply }, rx)
            .await
            .unwrap_or_default()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel holding the current state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Every transition from now on.
    pub fn transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    async fn request<T>(&self, cmd: EngineCommand, rx: oneshot::Receiver<T>) -> Result<T> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::Cancelled)?;
        rx.await.map_err(|_| SessionError::Cancelled)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct EngineActor {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<StateTransition>,
    registry: SubscriptionRegistry,
    target: Option<(String, AuthToken)>,
    waiters: Vec<Reply<Result<()>>>,
    /// Failed attempts since the last CONNECTED.
    attempt: u32,
    opening: Option<JoinHandle<std::result::Result<Link, TransportError>>>,
    link: Option<Link>,
    deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    send_beat: Option<Interval>,
    check_beat: Option<Interval>,
    monitor: HeartbeatMonitor,
}

impl EngineActor {
    #[instrument(name = "session_engine", skip_all)]
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.on_command(cmd).await;
                }
                result = join_open(&mut self.opening) => self.on_open(result).await,
                event = next_event(&mut self.link) => self.on_link_event(event).await,
                () = sleep_opt(self.deadline) => self.on_connect_timeout().await,
                () = sleep_opt(self.reconnect_at) => self.on_reconnect_timer(),
                () = tick_opt(&mut self.send_beat) => self.send_heartbeat().await,
                () = tick_opt(&mut self.check_beat) => self.check_heartbeat().await,
            }
        }

        debug!("all engine handles dropped, shutting down");
        self.teardown().await;
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn on_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Connect {
                endpoint,
                token,
                reply,
            } => self.on_connect(endpoint, token, reply),
            EngineCommand::Disconnect { reply } => {
                self.teardown().await;
                let _ = reply.send(());
            }
            EngineCommand::Subscribe {
                topic,
                handler,
                reply,
            } => {
                let _ = reply.send(self.on_subscribe(topic, handler).await);
            }
            EngineCommand::Unsubscribe { id, reply } => {
                self.on_unsubscribe(&id).await;
                let _ = reply.send(());
            }
            EngineCommand::UnsubscribeTopic { topic, reply } => {
                if let Some(id) = self.registry.id_for(&topic).cloned() {
                    self.on_unsubscribe(&id).await;
                }
                let _ = reply.send(());
            }
            EngineCommand::Send { envelope, reply } => {
                let _ = reply.send(self.on_send(&envelope).await);
            }
            EngineCommand::ActiveTopics { reply } => {
                let _ = reply.send(self.registry.topics());
            }
        }
    }

    fn on_connect(&mut self, endpoint: String, token: AuthToken, reply: Reply<Result<()>>) {
        match self.state {
            ConnectionState::Connected => {
                let _ = reply.send(Ok(()));
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.waiters.push(reply);
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                info!(%endpoint, "connecting");
                self.target = Some((endpoint, token));
                self.attempt = 0;
                self.waiters.push(reply);
                self.transition(ConnectionState::Connecting, None);
                self.start_open();
            }
        }
    }

    async fn on_subscribe(&mut self, topic: TopicPath, handler: FrameHandler) -> Result<SubscriptionId> {
        if self.state.is_idle() {
            return Err(SessionError::NotConnected);
        }
        let sub = self.registry.subscribe(topic.clone(), handler);
        debug!(%topic, id = %sub.id, replaced = sub.replaced.is_some(), "subscribed");
        if self.state.is_connected() {
            if let Some(old) = &sub.replaced {
                self.write(Frame::unsubscribe(old)).await;
            }
            self.write(Frame::subscribe(&sub.id, &topic)).await;
        }
        Ok(sub.id)
    }

    async fn on_unsubscribe(&mut self, id: &SubscriptionId) {
        if let Some(topic) = self.registry.unsubscribe(id) {
            debug!(%topic, %id, "unsubscribed");
            if self.state.is_connected() {
                self.write(Frame::unsubscribe(id)).await;
            }
        }
    }

    async fn on_send(&mut self, envelope: &OutboundEnvelope) -> Result<()> {
        let Some(handle) = self.connected_handle() else {
            return Err(SessionError::NotConnected);
        };
        let json = envelope.to_json()?;
        let destination = self.config.topics.send_destination();
        trace!(room = %envelope.room_id, nonce = %envelope.client_nonce, "send");
        self.connector
            .send(handle, Frame::send_json(&destination, json).encode())
            .await
            .map_err(|e| match e {
                TransportError::NotConnected => SessionError::NotConnected,
                other => SessionError::Transport(other),
            })
    }

    // ── Link lifecycle ──────────────────────────────────────────────

    fn start_open(&mut self) {
        let Some((endpoint, token)) = self.target.clone() else {
            return;
        };
        let connector = Arc::clone(&self.connector);
        self.opening = Some(tokio::spawn(async move {
            connector.open(&endpoint, &token).await
        }));
        self.deadline = Some(Instant::now() + self.config.connect_timeout);
    }

    async fn on_open(&mut self, result: std::result::Result<Link, TransportError>) {
        match result {
            Ok(link) => {
                let handle = link.handle;
                debug!(%handle, "transport open, sending CONNECT");
                self.link = Some(link);
                let Some((endpoint, token)) = &self.target else {
                    return;
                };
                let hb = &self.config.heartbeat;
                let connect = Frame::connect(token, (hb.outgoing_ms, hb.incoming_ms))
                    .header("host", endpoint_host(endpoint));
                if let Err(e) = self.connector.send(handle, connect.encode()).await {
                    self.on_failure(SessionError::Transport(e)).await;
                }
            }
            Err(e) => self.on_failure(SessionError::from_transport(e)).await,
        }
    }

    async fn on_link_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Open) => trace!("link open event"),
            Some(TransportEvent::Frame(data)) => {
                self.monitor.record_activity();
                let (frames, error) = frame::decode_partial(&data);
                if let Some(e) = error {
                    warn!(error = %e, len = data.len(), kept = frames.len(), "dropping malformed frame");
                }
                for frame in frames {
                    self.on_frame(frame).await;
                }
            }
            Some(TransportEvent::Error(e)) => {
                warn!(error = %e, "transport error");
                self.on_failure(SessionError::Transport(e)).await;
            }
            Some(TransportEvent::Closed { reason }) => {
                self.on_failure(SessionError::Transport(TransportError::Closed { reason }))
                    .await;
            }
            None => {
                self.on_failure(SessionError::Transport(TransportError::Closed {
                    reason: "link dropped".to_string(),
                }))
                .await;
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        match frame.command {
            Command::Connected if self.state == ConnectionState::Connecting => {
                self.on_connected(&frame).await;
            }
            Command::Message => {
                let Some(destination) = frame.get("destination") else {
                    warn!("dropping MESSAGE without destination");
                    return;
                };
                let inbound = InboundFrame::new(TopicPath::new(destination), frame.body.clone());
                match self.registry.route(inbound) {
                    Delivery::Delivered => {}
                    Delivery::UnknownTopic => debug!(destination, "dropping frame for unknown topic"),
                    Delivery::Backpressure(id) => {
                        warn!(destination, %id, "subscriber queue full, dropping frame");
                    }
                    Delivery::HandlerGone(id) => {
                        debug!(destination, %id, "subscriber gone, unsubscribing");
                        let _ = self.registry.unsubscribe(&id);
                        self.write(Frame::unsubscribe(&id)).await;
                    }
                }
            }
            Command::Error => {
                let reason = frame
                    .get("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| String::from_utf8_lossy(&frame.body).trim().to_string());
                if self.state == ConnectionState::Connecting {
                    warn!(%reason, "CONNECT rejected by server");
                    self.on_failure(SessionError::AuthenticationRejected { reason })
                        .await;
                } else {
                    warn!(%reason, "server sent ERROR");
                    self.on_failure(SessionError::Transport(TransportError::Closed {
                        reason: format!("server error: {reason}"),
                    }))
                    .await;
                }
            }
            Command::Receipt => trace!(receipt = ?frame.get("receipt-id"), "receipt"),
            other => debug!(command = %other, "ignoring unexpected frame"),
        }
    }

    async fn on_connected(&mut self, frame: &Frame) {
        self.deadline = None;
        self.attempt = 0;

        let ours = (
            self.config.heartbeat.outgoing_ms,
            self.config.heartbeat.incoming_ms,
        );
        let theirs = frame
            .get("heart-beat")
            .and_then(frame::parse_heart_beat)
            .unwrap_or((0, 0));
        let plan = heartbeat::negotiate(ours, theirs);
        self.send_beat = plan.send_every.map(periodic);
        self.check_beat = plan.expect_every.map(periodic);
        self.monitor = HeartbeatMonitor::new(self.config.heartbeat.max_missed);
        debug!(
            version = ?frame.get("version"),
            send_ms = ?plan.send_every.map(|d| d.as_millis()),
            expect_ms = ?plan.expect_every.map(|d| d.as_millis()),
            "session acknowledged"
        );

        for (id, topic) in self.registry.replay() {
            debug!(%topic, %id, "restoring subscription");
            self.write(Frame::subscribe(&id, &topic)).await;
        }

        self.transition(ConnectionState::Connected, None);
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    async fn on_connect_timeout(&mut self) {
        self.deadline = None;
        let timeout_ms = u64::try_from(self.config.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        self.on_failure(SessionError::Transport(TransportError::Timeout {
            timeout_ms,
            context: "transport open and CONNECTED frame".to_string(),
        }))
        .await;
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_at = None;
        info!(attempt = self.attempt, "reconnecting");
        self.transition(ConnectionState::Connecting, None);
        self.start_open();
    }

    /// Route a failure through the fatal / retry decision.
    async fn on_failure(&mut self, cause: SessionError) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }
        self.drop_link().await;

        if cause.is_fatal() {
            warn!(error = %cause, "fatal session error, not retrying");
            self.fail(cause);
            return;
        }

        self.attempt += 1;
        if self.config.reconnect.allows(self.attempt) {
            let delay = self.config.reconnect.delay_for(self.attempt);
            warn!(
                error = %cause,
                attempt = self.attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "connection lost, scheduling reconnect"
            );
            self.reconnect_at = Some(Instant::now() + delay);
            self.transition(ConnectionState::Reconnecting, Some(cause));
        } else {
            warn!(error = %cause, attempts = self.attempt - 1, "reconnect attempts exhausted");
            self.fail(cause);
        }
    }

    fn fail(&mut self, cause: SessionError) {
        self.reconnect_at = None;
        self.transition(ConnectionState::Failed, Some(cause.clone()));
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(cause.clone()));
        }
    }

    /// Explicit disconnect or shutdown.
    async fn teardown(&mut self) {
        self.reconnect_at = None;
        if let Some(handle) = self.connected_handle() {
            self.write_to(handle, Frame::disconnect()).await;
        }
        self.drop_link().await;
        self.registry.clear();
        self.target = None;
        self.attempt = 0;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(SessionError::Cancelled));
        }
        if self.state != ConnectionState::Disconnected {
            info!("disconnected");
            self.transition(ConnectionState::Disconnected, None);
        }
    }

    /// Close the link and stop every link-scoped timer.
    async fn drop_link(&mut self) {
        self.deadline = None;
        self.send_beat = None;
        self.check_beat = None;
        if let Some(task) = self.opening.take() {
            let connector = Arc::clone(&self.connector);
            drop(tokio::spawn(async move {
                if let Ok(Ok(link)) = task.await {
                    connector.close(link.handle).await;
                }
            }));
        }
        if let Some(link) = self.link.take() {
            self.connector.close(link.handle).await;
        }
    }

    // ── Heart-beats ─────────────────────────────────────────────────

    async fn send_heartbeat(&mut self) {
        if let Some(handle) = self.connected_handle() {
            if let Err(e) = self.connector.send(handle, frame::heartbeat()).await {
                debug!(error = %e, "heart-beat write failed");
            }
        }
    }

    async fn check_heartbeat(&mut self) {
        match self.monitor.check() {
            HeartbeatCheck::Alive => {}
            HeartbeatCheck::Missed(missed) => debug!(missed, "heart-beat interval silent"),
            HeartbeatCheck::TimedOut(missed) => {
                self.on_failure(SessionError::HeartbeatTimeout { missed }).await;
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn connected_handle(&self) -> Option<ConnectionHandle> {
        if self.state.is_connected() {
            self.link.as_ref().map(|link| link.handle)
        } else {
            None
        }
    }

    async fn write(&self, frame: Frame) {
        if let Some(link) = &self.link {
            self.write_to(link.handle, frame).await;
        }
    }

    async fn write_to(&self, handle: ConnectionHandle, frame: Frame) {
        let command = frame.command;
        if let Err(e) = self.connector.send(handle, frame.encode()).await {
            debug!(%command, error = %e, "frame write failed");
        }
    }

    fn transition(&mut self, to: ConnectionState, cause: Option<SessionError>) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        let _ = self.state_tx.send_replace(to);
        info!(%from, %to, "connection state changed");
        let _ = self.transitions.send(StateTransition { from, to, cause });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// select! arms that idle forever when disarmed
// ─────────────────────────────────────────────────────────────────────────────

async fn join_open(
    opening: &mut Option<JoinHandle<std::result::Result<Link, TransportError>>>,
) -> std::result::Result<Link, TransportError> {
    let Some(task) = opening.as_mut() else {
        return pending().await;
    };
    let result = task.await;
    *opening = None;
    result.unwrap_or_else(|e| Err(TransportError::Io(format!("open task failed: {e}"))))
}

async fn next_event(link: &mut Option<Link>) -> Option<TransportEvent> {
    match link.as_mut() {
        Some(link) => link.events.recv().await,
        None => pending().await,
    }
}

async fn sleep_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval.as_mut() {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => pending().await,
    }
}

/// Host part of `endpoint`, used as the STOMP virtual host.
fn endpoint_host(endpoint: &str) -> &str {
    let rest = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if authority.starts_with('[') {
        return authority
            .split_once(']')
            .map_or(authority, |(host, _)| &host[1..]);
    }
    authority.split(':').next().unwrap_or(authority)
}

fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
