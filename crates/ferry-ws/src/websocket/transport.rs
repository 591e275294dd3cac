//! The socket primitive the connection task drives.
//!
//! A [`Transport`] opens one socket at a time and reports what happens to
//! it as [`SocketEvent`]s: `Opened`, any number of `Message`s, then exactly
//! one `Closed`. A failed attempt reports only `Closed`.
//!
//! `wss` endpoints are reached over rustls, trusting the webpki root set.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use rustls::{ClientConfig as TlsConfig, RootCertStore, crypto::CryptoProvider};
use tokio_tungstenite::{
    Connector, connect_async_tls_with_config,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, warn};

use super::types::{ABNORMAL_CLOSE_CODE, ConnectionEpoch, NO_STATUS_CODE, NORMAL_CLOSE_CODE};
use crate::error::{TransportError, TransportResult};

/// What a socket reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The socket is gone.
    Closed {
        /// Close code (1006 when the socket dropped without one).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// A [`TransportEvent`] tagged with the socket that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketEvent {
    pub epoch: ConnectionEpoch,
    pub event: TransportEvent,
}

/// Channel a transport reports socket events on.
pub type EventSender = mpsc::UnboundedSender<SocketEvent>;

/// A message-oriented socket.
///
/// All methods return immediately; outcomes arrive on the event channel
/// handed to [`open`](Self::open).
pub trait Transport: Send + 'static {
    /// Start opening a socket to `url`.
    ///
    /// An `Err` here means the socket could not even be created (bad URL,
    /// bad request) and no event will follow. Network failures are reported
    /// later as `Closed`.
    fn open(&mut self, url: &str, epoch: ConnectionEpoch, events: EventSender)
    -> TransportResult<()>;

    /// Queue a text frame on the current socket.
    fn send(&mut self, text: String) -> TransportResult<()>;

    /// Begin closing the current socket with `code` and `reason`.
    fn close(&mut self, code: u16, reason: &str);
}

enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

struct SocketHandle {
    out_tx: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

/// [`Transport`] backed by `tokio-tungstenite`.
pub struct TungsteniteTransport {
    connect_timeout: Duration,
    max_message_size: usize,
    tls: Option<Arc<TlsConfig>>,
    socket: Option<SocketHandle>,
}

impl TungsteniteTransport {
    pub fn new(connect_timeout: Duration, max_message_size: usize) -> Self {
        Self {
            connect_timeout,
            max_message_size,
            tls: None,
            socket: None,
        }
    }

    /// TLS settings for `wss` sockets, built on first use.
    fn tls_config(&mut self) -> TransportResult<Arc<TlsConfig>> {
        if let Some(config) = &self.tls {
            return Ok(Arc::clone(config));
        }
        let config = build_tls_config()?;
        self.tls = Some(Arc::clone(&config));
        Ok(config)
    }
}

/// Client TLS config trusting the webpki roots.
///
/// Uses the process-wide crypto provider when one is installed, ring
/// otherwise.
fn build_tls_config() -> TransportResult<Arc<TlsConfig>> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

    let mut config = TlsConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::establish(format!("TLS setup failed: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

impl Transport for TungsteniteTransport {
    fn open(
        &mut self,
        url: &str,
        epoch: ConnectionEpoch,
        events: EventSender,
    ) -> TransportResult<()> {
        let request = url
            .into_client_request()
            .map_err(|e| TransportError::establish(format!("{url}: {e}")))?;
        let connector = match request.uri().scheme_str() {
            Some("wss") => Some(Connector::Rustls(self.tls_config()?)),
            _ => None,
        };

        if let Some(old) = self.socket.take() {
            old.task.abort();
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(socket_task(
            request,
            connector,
            epoch,
            events,
            out_rx,
            self.connect_timeout,
            self.max_message_size,
        ));
        self.socket = Some(SocketHandle { out_tx, task });
        Ok(())
    }

    fn send(&mut self, text: String) -> TransportResult<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| TransportError::websocket("Not connected"))?;
        socket
            .out_tx
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::websocket("Socket task gone"))
    }

    fn close(&mut self, code: u16, reason: &str) {
        if let Some(socket) = &self.socket {
            let _ = socket.out_tx.send(Outgoing::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}

/// Wait for a close request while the socket is not writable yet.
async fn close_requested(out_rx: &mut mpsc::UnboundedReceiver<Outgoing>) -> (u16, String) {
    while let Some(out) = out_rx.recv().await {
        match out {
            Outgoing::Close { code, reason } => return (code, reason),
            Outgoing::Text(_) => debug!("Dropping frame queued before open"),
        }
    }
    (NORMAL_CLOSE_CODE, "transport dropped".to_string())
}

async fn socket_task(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    connector: Option<Connector>,
    epoch: ConnectionEpoch,
    events: EventSender,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
    connect_timeout: Duration,
    max_message_size: usize,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(SocketEvent { epoch, event });
    };

    let ws = tokio::select! {
        connected = timeout(
            connect_timeout,
            connect_async_tls_with_config(request, None, false, connector),
        ) => match connected {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                warn!(error = %e, "WebSocket connect failed");
                emit(TransportEvent::Closed { code: ABNORMAL_CLOSE_CODE, reason: e.to_string() });
                return;
            }
            Err(_) => {
                warn!(timeout_ms = connect_timeout.as_millis(), "WebSocket connect timed out");
                emit(TransportEvent::Closed {
                    code: ABNORMAL_CLOSE_CODE,
                    reason: "connect timed out".to_string(),
                });
                return;
            }
        },
        (code, reason) = close_requested(&mut out_rx) => {
            emit(TransportEvent::Closed { code, reason });
            return;
        }
    };

    emit(TransportEvent::Opened);
    let (mut write, mut read) = ws.split();

    let (code, reason) = loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        let err = TransportError::from(e);
                        warn!(error = %err, "WebSocket write failed");
                        break (ABNORMAL_CLOSE_CODE, err.to_string());
                    }
                }
                Some(Outgoing::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    // Let the peer finish the closing handshake.
                    let _ = timeout(connect_timeout, async {
                        while let Some(Ok(msg)) = read.next().await {
                            if msg.is_close() {
                                break;
                            }
                        }
                    })
                    .await;
                    break (code, reason);
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break (NORMAL_CLOSE_CODE, "transport dropped".to_string());
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if max_message_size > 0 && text.len() > max_message_size {
                        warn!(size = text.len(), max = max_message_size, "Dropping oversized WebSocket message");
                        continue;
                    }
                    emit(TransportEvent::Message(text.as_str().to_string()));
                }
                Some(Ok(Message::Binary(data))) => {
                    if max_message_size > 0 && data.len() > max_message_size {
                        warn!(size = data.len(), max = max_message_size, "Dropping oversized WebSocket message");
                        continue;
                    }
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => emit(TransportEvent::Message(text)),
                        Err(e) => warn!(error = %e, "Dropping non UTF-8 binary frame"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    // Flush the close reply tungstenite queued for the peer.
                    let _ = timeout(connect_timeout, write.close()).await;
                    break match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                        None => (NO_STATUS_CODE, String::new()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read error");
                    break (ABNORMAL_CLOSE_CODE, e.to_string());
                }
                None => break (ABNORMAL_CLOSE_CODE, "connection reset".to_string()),
            }
        }
    };

    emit(TransportEvent::Closed { code, reason });
}
