//! Resilient WebSocket client for the ferry backend.
//!
//! This module provides:
//!
//! - **Managed lifecycle**: `Closed → Connecting → Open → Closed`, observable
//!   through a [`ConnectionStatus`] watch channel
//! - **Auto-Reconnection**: exponential backoff (5 s doubling to 60 s) after
//!   any close other than 1000 or 4001, with a per-second countdown
//! - **Request-Response Pattern**: `save`, `delete` and `rename` return a
//!   [`ReplyHandle`] resolved by the reply carrying the same id
//! - **Server Push**: frames without a waiting request go to handlers
//!   registered with [`FerryClient::add_command`]
//! - **Heartbeat**: `{"_command":"heartbeat"}` every 20 s while open
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐ ClientCommand ┌───────────────────┐  Transport  ┌──────────┐
//! │ FerryClient │──────────────▶│ ConnectionManager │────────────▶│  Server  │
//! │   (Clone)   │◀──────────────│   (Background)    │◀────────────│          │
//! └─────────────┘ watch status  └─────────┬─────────┘ SocketEvent └──────────┘
//!                                         │
//!          ┌──────────────────────┬───────┴──────────┬──────────────────┐
//!          ▼                      ▼                  ▼                  ▼
//! ┌──────────────────┐ ┌───────────────────┐ ┌───────────────┐ ┌──────────────────┐
//! │ CorrelationTable │ │ CommandDispatcher │ │ BackoffPolicy │ │ HeartbeatMonitor │
//! └──────────────────┘ └───────────────────┘ └───────────────┘ └──────────────────┘
//! ```
//!
//! Only the connection task touches the table, dispatcher and timers, so
//! none of them need locks.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ferry_ws::websocket::{ClientConfig, FerryClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://portia.example.com").project("p1");
//!     let client = FerryClient::new(config)?;
//!
//!     client.add_command("projectChanged", |frame| {
//!         println!("project changed: {:?}", frame.get("project"));
//!         Ok(())
//!     });
//!     client.connect();
//!
//!     let mut status = client.watch_status();
//!     status.wait_for(|s| s.is_open()).await?;
//!
//!     let reply = client.save("spider", &json!({"name": "books"})).await?;
//!     println!("saved: {reply}");
//!
//!     client.close(None, None);
//!     Ok(())
//! }
//! ```

mod actor;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod heartbeat;
pub mod notify;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::{FerryClient, ReplyHandle};
pub use config::{ClientConfig, normalize_url};
pub use dispatch::{CommandDispatcher, CommandHandler, Dispatch, HandlerError};
pub use heartbeat::HeartbeatMonitor;
pub use notify::{LogNotifier, Notifier};
pub use pending::CorrelationTable;
pub use protocol::{InboundFrame, OutboundEnvelope, RequestMeta};
pub use transport::{EventSender, SocketEvent, Transport, TransportEvent, TungsteniteTransport};
pub use types::{
    ABNORMAL_CLOSE_CODE, APPLICATION_UNLOADING_CODE, ConnectionEpoch, ConnectionState,
    ConnectionStatus, NORMAL_CLOSE_CODE, RequestId,
};
