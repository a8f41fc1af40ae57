//! WebSocket connector with SockJS fallback, over `tokio-tungstenite`.
//!
//! `open` walks the configured transport kinds in order. A credential
//! rejection on the upgrade stops the walk; any other handshake failure
//! moves on to the next kind. Once a socket is up, a pump task owns it and
//! bridges it to the link's outbound queue and event channel.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parley_core::{AuthToken, TransportError};
use parley_settings::{ConnectionSettings, TransportKind};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connector::{ConnectionHandle, Connector, Link, LinkTable, TransportEvent};
use crate::sockjs::{self, SockJsFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default capacity of the per-link channels.
const DEFAULT_LINK_BUFFER: usize = 256;

/// How payloads are wrapped on the socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Framing {
    Raw,
    SockJs,
}

/// Production connector.
pub struct WebSocketConnector {
    transports: Vec<TransportKind>,
    buffer: usize,
    links: Arc<LinkTable>,
}

impl WebSocketConnector {
    /// Connector trying `transports` in order.
    #[must_use]
    pub fn new(transports: Vec<TransportKind>) -> Self {
        Self {
            transports,
            buffer: DEFAULT_LINK_BUFFER,
            links: Arc::new(LinkTable::new()),
        }
    }

    /// Connector configured from the `connection` settings section.
    #[must_use]
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            buffer: settings.subscription_buffer.max(1),
            ..Self::new(settings.transports.clone())
        }
    }

    /// Number of links currently open.
    pub fn live_links(&self) -> usize {
        self.links.len()
    }

    async fn dial(
        &self,
        kind: TransportKind,
        base: &str,
        token: &AuthToken,
    ) -> Result<(WsStream, Framing), TransportError> {
        match kind {
            TransportKind::Websocket => {
                let ws = connect(base, token).await?;
                Ok((ws, Framing::Raw))
            }
            TransportKind::Sockjs => {
                let (server_id, session_id) = sockjs::random_session();
                let url = sockjs::transport_url(base, server_id, &session_id);
                let mut ws = connect(&url, token).await?;
                await_sockjs_open(&mut ws, &url).await?;
                Ok((ws, Framing::SockJs))
            }
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::from_settings(&ConnectionSettings::default())
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &str, token: &AuthToken) -> Result<Link, TransportError> {
        let base = websocket_url(endpoint)?;
        let mut last_err = TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "no transports configured".to_string(),
        };

        for &kind in &self.transports {
            match self.dial(kind, &base, token).await {
                Ok((ws, framing)) => {
                    let (outbound_tx, outbound_rx) = mpsc::channel(self.buffer);
                    let (events_tx, events_rx) = mpsc::channel(self.buffer);
                    let cancel = CancellationToken::new();
                    let handle = self.links.insert(outbound_tx, cancel.clone());

                    info!(%handle, ?kind, endpoint = %base, "transport open");
                    let _ = events_tx.send(TransportEvent::Open).await;
                    drop(tokio::spawn(pump(
                        ws,
                        framing,
                        outbound_rx,
                        events_tx,
                        cancel,
                        Arc::clone(&self.links),
                        handle,
                    )));

                    return Ok(Link {
                        handle,
                        events: events_rx,
                    });
                }
                Err(e) if e.is_auth_rejection() => {
                    warn!(?kind, error = %e, "credential rejected on upgrade");
                    return Err(e);
                }
                Err(e) => {
                    warn!(?kind, error = %e, "transport attempt failed, trying next");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn send(&self, handle: ConnectionHandle, frame: Bytes) -> Result<(), TransportError> {
        self.links.send(handle, frame).await
    }

    async fn close(&self, handle: ConnectionHandle) {
        if self.links.close(handle) {
            debug!(%handle, "transport closed by owner");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize an endpoint to a `ws`/`wss` URL without a trailing slash.
pub fn websocket_url(endpoint: &str) -> Result<String, TransportError> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let url = if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "expected ws, wss, http or https scheme".to_string(),
        });
    };

    let host = url.split_once("://").map_or("", |(_, rest)| rest);
    if host.is_empty() || host.starts_with('/') {
        return Err(TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

async fn connect(url: &str, token: &AuthToken) -> Result<WsStream, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::InvalidEndpoint {
            endpoint: url.to_string(),
            reason: e.to_string(),
        })?;
    let bearer = HeaderValue::from_str(&token.bearer()).map_err(|e| TransportError::Handshake {
        url: url.to_string(),
        reason: format!("credential is not a valid header value: {e}"),
    })?;
    let _ = request.headers_mut().insert(AUTHORIZATION, bearer);

    match connect_async(request).await {
        Ok((ws, _response)) => Ok(ws),
        Err(e) => Err(classify_handshake_error(url, &e)),
    }
}

fn classify_handshake_error(url: &str, err: &WsError) -> TransportError {
    if let WsError::Http(response) = err {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return TransportError::Unauthorized { status };
        }
    }
    TransportError::Handshake {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

async fn await_sockjs_open(ws: &mut WsStream, url: &str) -> Result<(), TransportError> {
    let handshake = |reason: String| TransportError::Handshake {
        url: url.to_string(),
        reason,
    };
    match ws.next().await {
        Some(Ok(Message::Text(text))) => match sockjs::parse_frame(text.as_str()) {
            Some(SockJsFrame::Open) => Ok(()),
            Some(SockJsFrame::Close { code, reason }) => {
                Err(handshake(format!("session closed ({code}): {reason}")))
            }
            _ => Err(handshake(format!("expected open frame, got {:?}", text.as_str()))),
        },
        Some(Ok(other)) => Err(handshake(format!("unexpected message {other:?}"))),
        Some(Err(e)) => Err(handshake(e.to_string())),
        None => Err(handshake("stream ended before open frame".to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pump
// ─────────────────────────────────────────────────────────────────────────────

async fn pump(
    ws: WsStream,
    framing: Framing,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    links: Arc<LinkTable>,
    handle: ConnectionHandle,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let text = String::from_utf8_lossy(&frame);
                let payload = match framing {
                    Framing::Raw => text.into_owned(),
                    Framing::SockJs => sockjs::encode_message(&text),
                };
                if let Err(e) = ws_tx.send(Message::Text(payload.into())).await {
                    let _ = events.send(TransportEvent::Error(TransportError::Io(e.to_string()))).await;
                    break;
                }
            }
            msg = ws_rx.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => {
                        if forward_text(framing, text.as_str(), &events).await {
                            continue;
                        }
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => TransportEvent::Frame(data),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|f| f.reason.as_str().to_string()).unwrap_or_default();
                        let _ = events.send(TransportEvent::Closed { reason }).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(TransportError::Io(e.to_string()))).await;
                        break;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed { reason: "stream ended".to_string() }).await;
                        break;
                    }
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }

    links.release(handle);
    debug!(%handle, "transport pump exited");
}

/// Forward one text message. Returns `false` when the link should end.
async fn forward_text(framing: Framing, text: &str, events: &mpsc::Sender<TransportEvent>) -> bool {
    match framing {
        Framing::Raw => events
            .send(TransportEvent::Frame(Bytes::copy_from_slice(text.as_bytes())))
            .await
            .is_ok(),
        Framing::SockJs => match sockjs::parse_frame(text) {
            Some(SockJsFrame::Messages(payloads)) => {
                for payload in payloads {
                    if events.send(TransportEvent::Frame(Bytes::from(payload))).await.is_err() {
                        return false;
                    }
                }
                true
            }
            Some(SockJsFrame::Open | SockJsFrame::Heartbeat) => true,
            Some(SockJsFrame::Close { code, reason }) => {
                let _ = events
                    .send(TransportEvent::Closed {
                        reason: format!("{code} {reason}"),
                    })
                    .await;
                false
            }
            None => {
                warn!(frame = text, "unrecognised SockJS frame, ignoring");
                true
            }
        },
    }
}
