//! Connection task owning the socket lifecycle.
//!
//! The task runs in the background and handles:
//! - Opening and closing the socket on request
//! - Reconnection with exponential backoff after unplanned closes
//! - The reconnect countdown published to observers
//! - Heartbeats while open
//! - Routing inbound frames to pending requests or command handlers
//!
//! Everything it owns (state, pending requests, handlers, timers) is touched
//! from this task only; the client talks to it through [`ClientCommand`]s.

use std::{future, pin::Pin, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep},
};
use tracing::{debug, error, info, warn};

use super::{
    config::ClientConfig,
    dispatch::{CommandDispatcher, CommandHandler, Dispatch},
    heartbeat::HeartbeatMonitor,
    notify::Notifier,
    pending::{CorrelationTable, ReplySender},
    protocol::{InboundFrame, OutboundEnvelope},
    transport::{SocketEvent, Transport, TransportEvent},
    types::{
        APPLICATION_UNLOADING_CODE, ConnectionEpoch, ConnectionState, ConnectionStatus,
        DEFAULT_CLOSE_REASON, NORMAL_CLOSE_CODE, RequestId, is_intentional_close,
    },
};
use crate::{error::TransportError, reconnect::BackoffPolicy};

// ============================================================================
// Commands
// ============================================================================

/// Commands sent from [`super::FerryClient`] to the connection task.
pub enum ClientCommand {
    /// Open a socket if none is active.
    Connect,
    /// Close the active socket, or cancel a pending reconnect.
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// Send an already serialized frame, fire and forget.
    Send { text: String },
    /// Send a correlated request and route its reply to `reply_tx`.
    Request {
        request_id: RequestId,
        text: String,
        reply_tx: ReplySender,
    },
    /// Register a handler for server-pushed frames.
    AddCommand {
        name: String,
        handler: CommandHandler,
    },
    /// Close with [`APPLICATION_UNLOADING_CODE`] and stop the task.
    Shutdown,
}

const SOCKET_DISCONNECTED: &str = "Socket disconnected";
const SOCKET_NOT_OPEN: &str = "Websocket is closed";
const CLIENT_SHUT_DOWN: &str = "Client shut down";
const UNLOADING_REASON: &str = "application unloading";

// ============================================================================
// Connection Manager
// ============================================================================

/// The connection state machine.
///
/// `Closed --connect--> Connecting --opened--> Open --closed--> Closed`,
/// with `Connecting --closed--> Closed` for failed attempts. Unplanned
/// closes arm a reconnect timer; close codes 1000 and 4001 do not.
pub struct ConnectionManager<T: Transport> {
    config: Arc<ClientConfig>,
    transport: T,
    notifier: Arc<dyn Notifier>,

    state: ConnectionState,
    /// Epoch of the socket we are currently interested in.
    epoch: ConnectionEpoch,
    backoff: BackoffPolicy,
    pending: CorrelationTable,
    commands: CommandDispatcher,
    heartbeat: HeartbeatMonitor,

    reconnect: Option<Pin<Box<Sleep>>>,
    countdown: Option<Interval>,
    seconds_until_reconnect: u64,

    cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    event_rx: mpsc::UnboundedReceiver<SocketEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        config: Arc<ClientConfig>,
        transport: T,
        notifier: Arc<dyn Notifier>,
        cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
        status_tx: watch::Sender<ConnectionStatus>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            backoff: config.backoff(),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval),
            config,
            transport,
            notifier,
            state: ConnectionState::Closed,
            epoch: ConnectionEpoch::default(),
            pending: CorrelationTable::new(),
            commands: CommandDispatcher::new(),
            reconnect: None,
            countdown: None,
            seconds_until_reconnect: 0,
            cmd_rx,
            event_tx,
            event_rx,
            status_tx,
        }
    }

    /// Run until the client shuts down or every client handle is dropped.
    pub async fn run(mut self) {
        info!(url = %self.config.url, "Starting ferry connection task");

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ClientCommand::Shutdown) | None => {
                        self.shutdown();
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },

                Some(event) = self.event_rx.recv() => self.handle_event(event),

                () = wait_for(&mut self.reconnect) => {
                    self.reconnect = None;
                    info!(epoch = self.epoch.0 + 1, "Reconnecting");
                    self.connect();
                }

                () = tick(&mut self.countdown) => {
                    let remaining = self.seconds_until_reconnect.saturating_sub(1);
                    self.set_seconds_until_reconnect(remaining);
                }

                () = self.heartbeat.tick() => self.send_heartbeat(),
            }
        }

        info!("Ferry connection task stopped");
    }

    pub(crate) fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Connect => self.connect(),
            ClientCommand::Close { code, reason } => self.close(code, reason),
            ClientCommand::Send { text } => self.send_text(text),
            ClientCommand::Request {
                request_id,
                text,
                reply_tx,
            } => self.request(request_id, text, reply_tx),
            ClientCommand::AddCommand { name, handler } => {
                debug!(command = %name, "Registering command handler");
                self.commands.register(name, handler);
            }
            ClientCommand::Shutdown => self.shutdown(),
        }
    }

    pub(crate) fn handle_event(&mut self, SocketEvent { epoch, event }: SocketEvent) {
        if epoch != self.epoch {
            debug!(
                event_epoch = epoch.0,
                current_epoch = self.epoch.0,
                "Ignoring event from stale socket"
            );
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Closed { code, reason } => self.on_close(code, &reason),
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn connect(&mut self) {
        if self.state != ConnectionState::Closed {
            debug!(state = ?self.state, "Connect ignored, socket already active");
            return;
        }

        self.cancel_reconnect();
        let epoch = self.epoch.bump();
        self.set_state(ConnectionState::Connecting);
        debug!(url = %self.config.url, epoch = epoch.0, "Connecting to WebSocket");

        if let Err(e) = self
            .transport
            .open(&self.config.url, epoch, self.event_tx.clone())
        {
            // Nothing to retry against: the socket could not even be built.
            error!(url = %self.config.url, error = %e, "Error connecting to server");
            self.set_state(ConnectionState::Closed);
        }
    }

    fn on_open(&mut self) {
        if self.state == ConnectionState::Open {
            debug!("Duplicate open ignored");
            return;
        }
        self.set_state(ConnectionState::Open);
        self.backoff.reset();
        self.heartbeat.start();
        info!(url = %self.config.url, "Connected to websocket");
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        if self.state == ConnectionState::Closed {
            debug!(code, "Duplicate close ignored");
            return;
        }

        self.heartbeat.stop();
        self.set_state(ConnectionState::Closed);
        info!(code, reason, "Closed websocket");

        let rejected = self.pending.reject_all(SOCKET_DISCONNECTED);
        if rejected > 0 {
            debug!(rejected, "Rejected pending requests on close");
        }

        if is_intentional_close(code) {
            return;
        }

        let delay = self.backoff.advance();
        self.schedule_reconnect(delay);
    }

    fn close(&mut self, code: Option<u16>, reason: Option<String>) {
        match self.state {
            ConnectionState::Closed => {
                if self.reconnect.is_some() {
                    info!("Pending reconnect cancelled");
                }
                self.cancel_reconnect();
            }
            ConnectionState::Connecting | ConnectionState::Open => {
                let code = code.unwrap_or(NORMAL_CLOSE_CODE);
                let reason = reason.as_deref().unwrap_or(DEFAULT_CLOSE_REASON);
                debug!(code, reason, "Closing websocket");
                self.transport.close(code, reason);
            }
        }
    }

    fn shutdown(&mut self) {
        self.cancel_reconnect();
        self.heartbeat.stop();
        if self.state != ConnectionState::Closed {
            self.transport.close(APPLICATION_UNLOADING_CODE, UNLOADING_REASON);
        }
        self.pending.reject_all(CLIENT_SHUT_DOWN);
        self.set_state(ConnectionState::Closed);
    }

    // ------------------------------------------------------------------
    // Reconnect countdown
    // ------------------------------------------------------------------

    fn schedule_reconnect(&mut self, delay: Duration) {
        let seconds =
            u64::try_from(delay.as_millis().saturating_add(500) / 1000).unwrap_or(u64::MAX);
        info!(delay_ms = delay.as_millis(), "Scheduling reconnect");
        self.reconnect = Some(Box::pin(sleep(delay)));
        self.set_seconds_until_reconnect(seconds);
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect = None;
        self.set_seconds_until_reconnect(0);
    }

    /// Store the countdown and keep its ticker in step: running while the
    /// value is positive, gone at zero.
    fn set_seconds_until_reconnect(&mut self, seconds: u64) {
        self.seconds_until_reconnect = seconds;
        if seconds == 0 {
            self.countdown = None;
        } else if self.countdown.is_none() {
            let period = self.config.countdown_tick;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.countdown = Some(ticker);
        }
        self.publish();
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(ConnectionStatus {
            state: self.state,
            seconds_until_reconnect: self.seconds_until_reconnect,
        });
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn send_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if self.state != ConnectionState::Open {
            debug!(state = ?self.state, "Dropping send, socket not open");
            return;
        }
        if let Err(e) = self.transport.send(text) {
            warn!(error = %e, "Failed to send message");
        }
    }

    fn request(&mut self, request_id: RequestId, text: String, reply_tx: ReplySender) {
        if self.state != ConnectionState::Open {
            let _ = reply_tx.send(Err(TransportError::connection_closed(SOCKET_NOT_OPEN)));
            return;
        }
        if !self.pending.register(request_id.clone(), reply_tx) {
            warn!(request_id = %request_id, "Refusing request with duplicate id");
            return;
        }
        debug!(request_id = %request_id, "Sending request");
        self.send_text(text);
    }

    fn send_heartbeat(&mut self) {
        match OutboundEnvelope::heartbeat().to_text() {
            Ok(text) => self.send_text(text),
            Err(e) => warn!(error = %e, "Failed to encode heartbeat"),
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn on_message(&mut self, text: &str) {
        if self.state != ConnectionState::Open {
            debug!("Dropping message received while not open");
            return;
        }

        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Error parsing data returned by server");
                return;
            }
        };

        let Some(command) = frame.command().map(str::to_owned) else {
            warn!(frame = %text, "Received response with no command");
            return;
        };

        if let Some(id) = frame.request_id() {
            if self.pending.contains(&id) {
                match frame.error_detail() {
                    Some(detail) => {
                        self.pending.reject(&id, TransportError::server(detail));
                    }
                    None => {
                        self.pending.resolve(&id, frame.into_value());
                    }
                }
                return;
            }
            debug!(request_id = %id, command = %command, "Reply for unknown request");
        }

        if let Some(detail) = frame.error_detail() {
            error!(command = %command, error = %detail, "Server reported error");
            self.notifier.show_error(&detail);
            return;
        }

        if self.commands.dispatch(&command, &frame) == Dispatch::Unknown {
            warn!(command = %command, "Received unknown command");
        }
    }

    #[cfg(test)]
    fn state(&self) -> ConnectionState {
        self.state
    }
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending::<()>().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending::<()>().await,
    }
}
