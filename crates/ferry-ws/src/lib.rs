//! # Ferry WebSocket
//!
//! Resilient WebSocket client for a scraping-project editor backend.
//!
//! The client keeps one socket to the backend alive across network failures,
//! correlates `save`/`delete`/`rename` requests with their replies, routes
//! server-pushed commands to registered handlers and exposes its connection
//! status for display.
//!
//! ## Features
//!
//! - **Reconnection**: exponential backoff with a visible countdown
//! - **Correlation**: every request carries a ULID in `_meta.id`
//! - **Pluggable transport**: production sockets use `tokio-tungstenite`;
//!   tests drive the state machine through the [`websocket::Transport`] trait
//! - **Observability**: structured logging through `tracing`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferry_ws::websocket::{ClientConfig, FerryClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FerryClient::new(ClientConfig::new("ws://localhost:9001/ws"))?;
//!     client.connect();
//!     let mut status = client.watch_status();
//!     status.wait_for(|s| s.is_open()).await?;
//!     let reply = client.delete("spider", "old-spider").await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod reconnect;
pub mod websocket;

pub use error::{TransportError, TransportResult};
pub use reconnect::BackoffPolicy;
pub use websocket::{ClientConfig, ConnectionState, ConnectionStatus, FerryClient, ReplyHandle};
