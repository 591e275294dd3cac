//! Application-facing handle to the connection task.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::{
    actor::{ClientCommand, ConnectionManager},
    config::ClientConfig,
    dispatch::HandlerError,
    notify::{LogNotifier, Notifier},
    protocol::{InboundFrame, OutboundEnvelope, RequestMeta, is_truthy},
    transport::{Transport, TungsteniteTransport},
    types::{ConnectionStatus, RequestId},
};
use crate::error::{TransportError, TransportResult};

#[derive(Debug, Default)]
struct RequestContext {
    project: Option<String>,
    spider: Option<String>,
}

/// Handle to a resilient ferry WebSocket.
///
/// Cloning is cheap and every clone talks to the same connection task. The
/// task closes the socket with code 4001 and stops once the last handle is
/// dropped or [`shutdown`](Self::shutdown) is called.
///
/// All methods are synchronous and keep their call order: a `send` issued
/// after `connect` is seen by the task after the connect.
#[derive(Clone)]
pub struct FerryClient {
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    status_rx: watch::Receiver<ConnectionStatus>,
    context: Arc<RwLock<RequestContext>>,
}

impl FerryClient {
    /// Create a client on a real socket. Must be called inside a Tokio runtime.
    ///
    /// The client starts closed; call [`connect`](Self::connect) to open it.
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        let transport = TungsteniteTransport::new(config.connect_timeout, config.max_message_size);
        Self::with_transport(config, transport, LogNotifier)
    }

    /// Create a client over a custom [`Transport`] and [`Notifier`].
    pub fn with_transport<T, N>(
        config: ClientConfig,
        transport: T,
        notifier: N,
    ) -> TransportResult<Self>
    where
        T: Transport,
        N: Notifier,
    {
        config.validate().map_err(TransportError::config)?;

        let context = RequestContext {
            project: config.project.clone(),
            spider: config.spider.clone(),
        };
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        let manager = ConnectionManager::new(
            Arc::new(config),
            transport,
            Arc::new(notifier),
            cmd_rx,
            status_tx,
        );
        tokio::spawn(manager.run());

        Ok(Self {
            cmd_tx,
            status_rx,
            context: Arc::new(RwLock::new(context)),
        })
    }

    fn command(&self, cmd: ClientCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Connection task has stopped, command dropped");
        }
    }

    /// Open the socket. No-op while connecting or open.
    pub fn connect(&self) {
        self.command(ClientCommand::Connect);
    }

    /// Close the socket with `code` (default 1000) and `reason`.
    ///
    /// While closed this cancels a pending reconnect instead.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.command(ClientCommand::Close {
            code,
            reason: reason.map(str::to_string),
        });
    }

    /// Close with code 4001 and stop the connection task.
    pub fn shutdown(&self) {
        self.command(ClientCommand::Shutdown);
    }

    /// Send `data` without waiting for a reply.
    ///
    /// Strings go out as-is, anything else as JSON. Falsy payloads (`null`,
    /// `false`, `0`, `""`) are ignored, and so is everything while the socket
    /// is not open.
    pub fn send<T: Serialize + ?Sized>(&self, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) if !is_truthy(&value) => {}
            Ok(Value::String(text)) => self.send_text(text),
            Ok(value) => self.send_text(value.to_string()),
            Err(e) => warn!(error = %e, "Failed to serialize outgoing message"),
        }
    }

    /// Send a raw text frame without waiting for a reply.
    pub fn send_text(&self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.command(ClientCommand::Send { text });
    }

    /// Register `handler` for server-pushed frames whose `_command` is `name`.
    ///
    /// A later registration for the same name replaces the earlier one.
    pub fn add_command<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&InboundFrame) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.command(ClientCommand::AddCommand {
            name: name.into(),
            handler: Arc::new(handler),
        });
    }

    /// Save `obj` as an object of kind `kind`.
    pub fn save<T: Serialize + ?Sized>(&self, kind: &str, obj: &T) -> ReplyHandle {
        let meta = self.meta(kind);
        let id = meta.id.clone();
        self.request(id, OutboundEnvelope::save(meta, obj))
    }

    /// Delete the object `name` of kind `kind`.
    pub fn delete(&self, kind: &str, name: &str) -> ReplyHandle {
        let meta = self.meta(kind);
        let id = meta.id.clone();
        self.request(id, Ok(OutboundEnvelope::delete(meta, name)))
    }

    /// Rename the object `from` of kind `kind` to `to`.
    pub fn rename(&self, kind: &str, from: &str, to: &str) -> ReplyHandle {
        let meta = self.meta(kind);
        let id = meta.id.clone();
        self.request(id, Ok(OutboundEnvelope::rename(meta, from, to)))
    }

    /// Project named in the `_meta` of subsequent requests.
    pub fn set_project(&self, project: Option<String>) {
        self.context.write().project = project;
    }

    /// Spider named in the `_meta` of subsequent requests.
    pub fn set_spider(&self, spider: Option<String>) {
        self.context.write().spider = spider;
    }

    fn meta(&self, kind: &str) -> RequestMeta {
        let context = self.context.read();
        RequestMeta::new(kind).with_context(context.project.clone(), context.spider.clone())
    }

    fn request(
        &self,
        request_id: RequestId,
        envelope: TransportResult<OutboundEnvelope>,
    ) -> ReplyHandle {
        let (reply_tx, reply_rx) = oneshot::channel();
        match envelope.and_then(|envelope| envelope.to_text()) {
            // A stopped task drops `reply_tx`, which the handle reports as closed.
            Ok(text) => self.command(ClientCommand::Request {
                request_id: request_id.clone(),
                text,
                reply_tx,
            }),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Failed to encode request");
                let _ = reply_tx.send(Err(e));
            }
        }
        ReplyHandle {
            request_id,
            reply_rx,
        }
    }

    /// Current observable status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// A receiver that sees every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }

    pub fn is_connecting(&self) -> bool {
        self.status().is_connecting()
    }

    pub fn seconds_until_reconnect(&self) -> u64 {
        self.status().seconds_until_reconnect
    }
}

/// Completion of a correlated request.
///
/// Resolves with the server's reply frame, or fails with
/// [`TransportError::Server`] when the reply carries an error and
/// [`TransportError::ConnectionClosed`] when the socket closes first.
/// Dropping the handle abandons the reply; the request stays correlated
/// until it completes.
#[derive(Debug)]
pub struct ReplyHandle {
    request_id: RequestId,
    reply_rx: oneshot::Receiver<TransportResult<Value>>,
}

impl ReplyHandle {
    /// Correlation id sent in `_meta.id`.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for ReplyHandle {
    type Output = TransportResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply_rx).poll(cx).map(|outcome| {
            outcome.unwrap_or_else(|_| {
                Err(TransportError::connection_closed("Connection task stopped"))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config =
            ClientConfig::new("ws://localhost/ws").heartbeat_interval(std::time::Duration::ZERO);
        let result = FerryClient::new(config);
        assert!(matches!(result, Err(TransportError::Config { .. })));
    }

    #[tokio::test]
    async fn test_new_client_starts_closed() {
        let client = FerryClient::new(ClientConfig::new("ws://localhost:1/ws")).unwrap();
        let status = client.status();
        assert!(status.is_closed());
        assert_eq!(status.seconds_until_reconnect, 0);
        assert!(!client.is_open());
        assert!(!client.is_connecting());
    }

    #[tokio::test]
    async fn test_request_while_closed_fails_fast() {
        let client = FerryClient::new(ClientConfig::new("ws://localhost:1/ws")).unwrap();
        let err = client.delete("spider", "books").await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_request_after_shutdown_reports_closed() {
        let client = FerryClient::new(ClientConfig::new("ws://localhost:1/ws")).unwrap();
        client.shutdown();
        let err = client.rename("spider", "a", "b").await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let client = FerryClient::new(ClientConfig::new("ws://localhost:1/ws")).unwrap();
        let first = client.delete("spider", "a");
        let second = client.delete("spider", "a");
        assert_ne!(first.request_id(), second.request_id());
    }
}
